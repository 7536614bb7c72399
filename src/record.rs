//! Record types for the three line-delimited sources of a merge.
//!
//! - [`PrimaryEntry`] - one CORE record (anchor of the merge)
//! - [`GraphEntry`] - one MAG record, matched many-to-one onto CORE records
//! - [`MergedRecord`] - the output document, one per primary entry
//!
//! Upstream dumps are loose about scalar types (volumes as numbers, citation
//! counts as strings), so scalar fields go through the lenient deserializers
//! at the bottom of this module instead of failing the whole line.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Author as it appears in the graph corpus.
///
/// Unknown keys (`org`, ...) are kept and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One record of the graph corpus (MAG).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphEntry {
    #[serde(deserialize_with = "required_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<Author>>,
    #[serde(default)]
    pub venue: Option<Value>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub year: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub n_citation: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub page_start: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub page_end: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub doc_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publisher: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub volume: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub issue: Option<String>,
}

/// One record of the primary corpus (CORE).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryEntry {
    #[serde(deserialize_with = "required_string")]
    pub core_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    /// CORE lists authors as plain names; only the count is compared.
    #[serde(default, deserialize_with = "lenient_list")]
    pub authors: Vec<Value>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publisher: Option<String>,
    #[serde(default)]
    pub enrichments: Option<Enrichments>,
    #[serde(default)]
    pub oai: Option<String>,
    #[serde(default)]
    pub identifiers: Option<Value>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// CORE enrichment block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichments {
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub citation_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentType {
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
}

impl PrimaryEntry {
    pub fn document_type(&self) -> Option<&str> {
        self.enrichments
            .as_ref()
            .and_then(|e| e.document_type.as_ref())
            .and_then(|d| d.kind.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn citation_count(&self) -> Option<i64> {
        self.enrichments.as_ref().and_then(|e| e.citation_count)
    }
}

/// Which source supplied the resolved DOI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DoiSource {
    Graph,
    Primary,
}

/// Which source supplied the full text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FullTextSource {
    External,
    Primary,
}

/// Output document. Field order is the fixed output schema; every field is
/// always written, `null` when no source supplied a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub mag_ids: Vec<String>,
    pub doi: Option<String>,
    pub doi_source: Option<DoiSource>,
    pub authors: Option<Vec<Author>>,
    pub title: Option<String>,
    pub venue: Option<Value>,
    pub year: Option<i64>,
    pub n_citation: Option<i64>,
    pub page_start: Option<String>,
    pub page_end: Option<String>,
    pub doc_type: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub core_id: String,
    pub full_text: Option<String>,
    pub full_text_source: FullTextSource,
    pub fields_of_study: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub oai: Option<String>,
    pub identifiers: Option<Value>,
    pub download_url: Option<String>,
}

/// A value that counts as "supplied" for first-non-empty-wins merging.
pub trait Filled {
    fn is_filled(&self) -> bool;
}

impl Filled for String {
    fn is_filled(&self) -> bool {
        !self.is_empty()
    }
}

impl Filled for i64 {
    fn is_filled(&self) -> bool {
        *self != 0
    }
}

impl Filled for Value {
    fn is_filled(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }
}

impl<T: Filled> Filled for Vec<T> {
    fn is_filled(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Filled> Filled for Option<T> {
    fn is_filled(&self) -> bool {
        self.as_ref().is_some_and(Filled::is_filled)
    }
}

// === Lenient deserializers ===

fn required_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected non-empty identifier, got {}",
            other
        ))),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_list<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    })
}

fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_graph_entry_lenient_scalars() {
        let entry: GraphEntry = serde_json::from_value(json!({
            "id": "53e9",
            "doi": "10.1/a",
            "year": "2011",
            "n_citation": 12,
            "volume": 7,
            "issue": null,
            "authors": [{"id": "a1", "name": "Ada", "org": "Leipzig"}]
        }))
        .expect("graph entry");

        assert_eq!(entry.year, Some(2011));
        assert_eq!(entry.n_citation, Some(12));
        assert_eq!(entry.volume.as_deref(), Some("7"));
        assert_eq!(entry.issue, None);
        let authors = entry.authors.expect("authors");
        assert_eq!(authors[0].extra.get("org"), Some(&json!("Leipzig")));
    }

    #[test]
    fn test_primary_entry_requires_core_id() {
        let missing = serde_json::from_value::<PrimaryEntry>(json!({"doi": "10.1/a"}));
        assert!(missing.is_err());

        let entry: PrimaryEntry = serde_json::from_value(json!({
            "coreId": 42,
            "fullText": "text",
            "downloadUrl": "https://core.ac.uk/download/42.pdf",
            "enrichments": {"documentType": {"type": "research"}, "citationCount": "9"}
        }))
        .expect("primary entry");
        assert_eq!(entry.core_id, "42");
        assert_eq!(entry.document_type(), Some("research"));
        assert_eq!(entry.citation_count(), Some(9));
    }

    #[test]
    fn test_primary_entry_null_authors() {
        let entry: PrimaryEntry =
            serde_json::from_value(json!({"coreId": "1", "authors": null, "title": "T"})).expect("primary entry");
        assert!(entry.authors.is_empty());

        let entry: PrimaryEntry =
            serde_json::from_value(json!({"coreId": "2", "authors": ["Ada", "Bo"]})).expect("primary entry");
        assert_eq!(entry.authors.len(), 2);
    }

    #[test]
    fn test_filled() {
        assert!(!String::new().is_filled());
        assert!(!0i64.is_filled());
        assert!(!json!({}).is_filled());
        assert!(json!({"raw": "Nature"}).is_filled());
        assert!(!Option::<String>::None.is_filled());
    }

    #[test]
    fn test_merged_record_field_order() {
        let record = MergedRecord {
            mag_ids: vec![],
            doi: None,
            doi_source: None,
            authors: None,
            title: None,
            venue: None,
            year: None,
            n_citation: None,
            page_start: None,
            page_end: None,
            doc_type: None,
            publisher: None,
            volume: None,
            issue: None,
            core_id: "1".to_string(),
            full_text: None,
            full_text_source: FullTextSource::Primary,
            fields_of_study: vec![],
            abstract_text: None,
            oai: None,
            identifiers: None,
            download_url: None,
        };
        let line = serde_json::to_string(&record).expect("serialize");
        assert!(line.starts_with(r#"{"mag_ids":[],"doi":null,"doi_source":null"#));
        assert!(line.contains(r#""full_text_source":"primary""#));
        assert!(line.ends_with(r#""identifiers":null,"download_url":null}"#));
    }
}
