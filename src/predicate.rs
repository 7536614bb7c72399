//! Named record predicates for restricting which primary entries are merged.
//!
//! Predicates address fields of the raw JSON record by dotted path
//! (`enrichments.documentType.type`) and are given on the command line as
//!
//! - `nonempty:FIELD`
//! - `eq:FIELD=VALUE`
//! - `in:FIELD=V1|V2|V3`
//!
//! A [`PredicateSet`] accepts a record only if every predicate holds.

use crate::error::{MergeError, OptionExt, Result};
use crate::record::Filled;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    NonEmpty { field: String },
    Equals { field: String, value: String },
    InSet { field: String, values: Vec<String> },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::NonEmpty { field }
            | Predicate::Equals { field, .. }
            | Predicate::InSet { field, .. } => field,
        }
    }

    pub fn holds(&self, record: &Value) -> bool {
        let value = lookup(record, self.field());
        match self {
            Predicate::NonEmpty { .. } => value.is_some_and(Filled::is_filled),
            Predicate::Equals { value: expected, .. } => {
                value.is_some_and(|v| scalar_matches(v, expected))
            }
            Predicate::InSet { values, .. } => {
                value.is_some_and(|v| values.iter().any(|expected| scalar_matches(v, expected)))
            }
        }
    }
}

impl FromStr for Predicate {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_parse(&format!("predicate '{}' has no kind prefix", s))?;

        let predicate = match kind {
            "nonempty" => Predicate::NonEmpty {
                field: rest.to_string(),
            },
            "eq" => {
                let (field, value) = rest
                    .split_once('=')
                    .ok_or_parse(&format!("predicate '{}' needs FIELD=VALUE", s))?;
                Predicate::Equals {
                    field: field.to_string(),
                    value: value.to_string(),
                }
            }
            "in" => {
                let (field, values) = rest
                    .split_once('=')
                    .ok_or_parse(&format!("predicate '{}' needs FIELD=V1|V2", s))?;
                Predicate::InSet {
                    field: field.to_string(),
                    values: values.split('|').map(str::to_string).collect(),
                }
            }
            other => {
                return Err(MergeError::Parse(format!(
                    "unknown predicate kind '{}' (expected nonempty, eq or in)",
                    other
                )))
            }
        };

        if predicate.field().is_empty() {
            return Err(MergeError::Parse(format!("predicate '{}' has an empty field", s)));
        }
        Ok(predicate)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::NonEmpty { field } => write!(f, "nonempty:{}", field),
            Predicate::Equals { field, value } => write!(f, "eq:{}={}", field, value),
            Predicate::InSet { field, values } => write!(f, "in:{}={}", field, values.join("|")),
        }
    }
}

/// Conjunction of predicates. Empty set accepts everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

impl PredicateSet {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn accepts(&self, record: &Value) -> bool {
        self.predicates.iter().all(|p| p.holds(record))
    }
}

impl fmt::Display for PredicateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.predicates.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |node, key| node.get(key))
}

fn scalar_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "coreId": "1",
            "publisher": "Hindawi Publishing Corporation",
            "fullText": "",
            "year": 2015,
            "enrichments": {"documentType": {"type": "research"}}
        })
    }

    #[test]
    fn test_parse_predicates() {
        let p: Predicate = "eq:publisher=Hindawi Publishing Corporation".parse().expect("eq");
        assert_eq!(
            p,
            Predicate::Equals {
                field: "publisher".to_string(),
                value: "Hindawi Publishing Corporation".to_string()
            }
        );
        let p: Predicate = "in:year=2014|2015".parse().expect("in");
        assert_eq!(p.to_string(), "in:year=2014|2015");
        assert!("nonempty:".parse::<Predicate>().is_err());
        assert!("contains:title=x".parse::<Predicate>().is_err());
        assert!("eq:publisher".parse::<Predicate>().is_err());
    }

    #[test]
    fn test_nested_field_lookup() {
        let p: Predicate = "eq:enrichments.documentType.type=research".parse().expect("eq");
        assert!(p.holds(&record()));
        let p: Predicate = "nonempty:enrichments.missing.type".parse().expect("nonempty");
        assert!(!p.holds(&record()));
    }

    #[test]
    fn test_set_short_circuits_on_first_failure() {
        let set = PredicateSet::new(vec![
            "in:year=2015|2016".parse().expect("in"),
            "nonempty:fullText".parse().expect("nonempty"),
        ]);
        assert!(!set.accepts(&record()));
        assert!(PredicateSet::default().accepts(&record()));
    }
}
