//! Check recorded DOI conflicts against Crossref.
//!
//! Each conflict from `doi_checkup.json` gets the registered title of both
//! DOIs looked up and compared with the entry's titles. The verdict names
//! the DOI(s) whose registered title matches.

use crate::crossref::{titles_similar, CrossrefClient, TitleLookup};
use crate::error::Result;
use crate::report::DoiConflict;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Name of the verification table written next to the checkup file
pub const VERIFICATION_FILE: &str = "doi_verification.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Graph,
    Primary,
    Both,
    Neither,
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Graph => "graph",
            Verdict::Primary => "primary",
            Verdict::Both => "both",
            Verdict::Neither => "neither",
            Verdict::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One row of `doi_verification.csv`
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub graph_doi: String,
    pub primary_doi: String,
    pub graph_title: String,
    pub primary_title: String,
    pub graph_registered: String,
    pub primary_registered: String,
    pub verdict: Verdict,
}

fn lookup_cell(lookup: &TitleLookup) -> String {
    match lookup {
        TitleLookup::Found(title) => title.clone(),
        TitleLookup::NoTitle => String::new(),
        TitleLookup::Status(code) => code.to_string(),
        TitleLookup::Unavailable => "unavailable".to_string(),
    }
}

/// Does the registered title match either of the entry's titles?
fn confirms(lookup: &TitleLookup, conflict: &DoiConflict) -> bool {
    let Some(registered) = lookup.title() else {
        return false;
    };
    [&conflict.graph_title, &conflict.primary_title]
        .into_iter()
        .flatten()
        .any(|title| titles_similar(registered, title))
}

/// Decide a verdict from the two lookups.
pub fn judge(conflict: &DoiConflict, graph: &TitleLookup, primary: &TitleLookup) -> Verification {
    let verdict = if graph.is_unavailable() || primary.is_unavailable() {
        Verdict::Unknown
    } else {
        match (confirms(graph, conflict), confirms(primary, conflict)) {
            (true, true) => Verdict::Both,
            (true, false) => Verdict::Graph,
            (false, true) => Verdict::Primary,
            (false, false) => Verdict::Neither,
        }
    };

    Verification {
        graph_doi: conflict.graph_doi.clone(),
        primary_doi: conflict.primary_doi.clone(),
        graph_title: conflict.graph_title.clone().unwrap_or_default(),
        primary_title: conflict.primary_title.clone().unwrap_or_default(),
        graph_registered: lookup_cell(graph),
        primary_registered: lookup_cell(primary),
        verdict,
    }
}

/// Look up both DOIs of every conflict and judge them.
pub async fn verify_conflicts(client: &CrossrefClient, conflicts: &[DoiConflict]) -> Vec<Verification> {
    let graph_dois: Vec<String> = conflicts.iter().map(|c| c.graph_doi.clone()).collect();
    let primary_dois: Vec<String> = conflicts.iter().map(|c| c.primary_doi.clone()).collect();

    let (graph, primary) = futures::join!(
        client.titles_for_dois(&graph_dois),
        client.titles_for_dois(&primary_dois)
    );

    conflicts
        .iter()
        .zip(graph.iter().zip(primary.iter()))
        .map(|(conflict, (g, p))| judge(conflict, g, p))
        .collect()
}

/// Write verification rows as CSV.
pub fn save_verifications(path: &Path, rows: &[Verification]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Verification table saved");
    Ok(())
}

/// Tally of verdicts, in the order graph, primary, both, neither, unknown
pub fn tally(rows: &[Verification]) -> [(Verdict, usize); 5] {
    let mut counts = [
        (Verdict::Graph, 0),
        (Verdict::Primary, 0),
        (Verdict::Both, 0),
        (Verdict::Neither, 0),
        (Verdict::Unknown, 0),
    ];
    for row in rows {
        if let Some(slot) = counts.iter_mut().find(|(v, _)| *v == row.verdict) {
            slot.1 += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn conflict() -> DoiConflict {
        DoiConflict {
            graph_doi: "10.1/graph".into(),
            primary_doi: "10.1/primary".into(),
            graph_title: Some("Coral reef resilience under warming".into()),
            primary_title: Some("Coral Reef Resilience Under Warming".into()),
        }
    }

    fn found(title: &str) -> TitleLookup {
        TitleLookup::Found(title.to_string())
    }

    #[test]
    fn test_verdicts() {
        let c = conflict();
        let right = found("Coral reef resilience under warming.");
        let wrong = found("Interest rate shocks in small economies");

        assert_eq!(judge(&c, &right, &wrong).verdict, Verdict::Graph);
        assert_eq!(judge(&c, &TitleLookup::Status(404), &right).verdict, Verdict::Primary);
        assert_eq!(judge(&c, &right, &right).verdict, Verdict::Both);
        assert_eq!(judge(&c, &wrong, &TitleLookup::NoTitle).verdict, Verdict::Neither);
        assert_eq!(judge(&c, &right, &TitleLookup::Unavailable).verdict, Verdict::Unknown);
    }

    #[test]
    fn test_save_verifications() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(VERIFICATION_FILE);
        let rows = vec![judge(&conflict(), &TitleLookup::Status(404), &TitleLookup::NoTitle)];
        save_verifications(&path, &rows)?;

        let text = std::fs::read_to_string(&path)?;
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("graph_doi,primary_doi,graph_title,primary_title,graph_registered,primary_registered,verdict")
        );
        assert_eq!(
            lines.next(),
            Some("10.1/graph,10.1/primary,Coral reef resilience under warming,Coral Reef Resilience Under Warming,404,,neither")
        );
        assert_eq!(tally(&rows)[3], (Verdict::Neither, 1));
        Ok(())
    }
}
