use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value the batch service puts in `message` when it has no match for a key
pub const NO_RESULT_SENTINEL: &str = "No Result Found";

/// Identifier types the batch service can look papers up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    /// Web of Science accession number
    Ut,
    /// Digital object identifier
    Doi,
    /// PubMed identifier
    Pmid,
}

impl IdType {
    /// Field name used on the wire, both in requests and responses
    pub fn wire_name(&self) -> &'static str {
        match self {
            IdType::Ut => "ut",
            IdType::Doi => "doi",
            IdType::Pmid => "pmid",
        }
    }
}

impl std::fmt::Display for IdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdType::Ut => write!(f, "UT"),
            IdType::Doi => write!(f, "DOI"),
            IdType::Pmid => write!(f, "PMID"),
        }
    }
}

impl std::str::FromStr for IdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ut" => Ok(IdType::Ut),
            "doi" => Ok(IdType::Doi),
            "pmid" => Ok(IdType::Pmid),
            other => Err(format!("unknown identifier type '{}'", other)),
        }
    }
}

/// A single lookup key for the batch service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub id_type: IdType,
    pub value: String,
}

impl QueryKey {
    pub fn new(id_type: IdType, value: impl Into<String>) -> Self {
        Self {
            id_type,
            value: value.into(),
        }
    }

    pub fn doi(value: impl Into<String>) -> Self {
        Self::new(IdType::Doi, value)
    }

    pub fn pmid(value: impl Into<String>) -> Self {
        Self::new(IdType::Pmid, value)
    }

    pub fn ut(value: impl Into<String>) -> Self {
        Self::new(IdType::Ut, value)
    }
}

/// One paper as returned by the batch citation service: flat named scalar fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    fields: BTreeMap<String, String>,
}

impl CitationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The identifier of the given type echoed back by the service
    pub fn id(&self, id_type: IdType) -> Option<&str> {
        self.get(id_type.wire_name())
    }

    pub fn times_cited(&self) -> Option<u32> {
        self.get("timesCited").and_then(|v| v.trim().parse().ok())
    }

    /// True when the service reported that it has no paper for the requested key
    pub fn is_not_found(&self) -> bool {
        self.get("message") == Some(NO_RESULT_SENTINEL)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CitationRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One search result scraped from a summary page.
///
/// Every field is extracted on its own; a field that cannot be found or
/// parsed is left empty without affecting the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: Option<String>,
    pub first_author: Option<String>,
    pub volume: Option<String>,
    pub pages: Option<String>,
    pub article_number: Option<String>,
    pub year: Option<i32>,
    pub times_cited: Option<u32>,
}

/// Normalize a string for comparison: lowercase, collapse whitespace, remove punctuation
pub fn normalize_string(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_sentinel() {
        let record: CitationRecord = [("message", NO_RESULT_SENTINEL)].into_iter().collect();
        assert!(record.is_not_found());

        let record: CitationRecord = [("doi", "10.1/x"), ("timesCited", "42")]
            .into_iter()
            .collect();
        assert!(!record.is_not_found());
        assert_eq!(record.times_cited(), Some(42));
        assert_eq!(record.id(IdType::Doi), Some("10.1/x"));
    }

    #[test]
    fn test_id_type_parsing() {
        assert_eq!("DOI".parse::<IdType>(), Ok(IdType::Doi));
        assert_eq!("pmid".parse::<IdType>(), Ok(IdType::Pmid));
        assert!("isbn".parse::<IdType>().is_err());
        assert_eq!(IdType::Ut.wire_name(), "ut");
    }
}
