use crate::record::IdType;
use biblatex::{Bibliography, ChunksExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaperError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse BibTeX: {0}")]
    ParseError(String),
}

/// A paper to look up, as read from a bibliography
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Citation key from the bib file
    pub key: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    /// Web of Science accession number
    pub ut: Option<String>,
}

impl Paper {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// The identifier of the given type, if this paper has one
    pub fn id(&self, id_type: IdType) -> Option<&str> {
        match id_type {
            IdType::Ut => self.ut.as_deref(),
            IdType::Doi => self.doi.as_deref(),
            IdType::Pmid => self.pmid.as_deref(),
        }
    }
}

/// Parse a .bib file and return the papers it lists
pub fn parse_bib_file(path: &Path) -> Result<Vec<Paper>, PaperError> {
    let content = fs::read_to_string(path)?;
    parse_bib_string(&content)
}

/// Parse a BibTeX string and return the papers it lists
pub fn parse_bib_string(content: &str) -> Result<Vec<Paper>, PaperError> {
    let bibliography =
        Bibliography::parse(content).map_err(|e| PaperError::ParseError(e.to_string()))?;

    let mut papers = Vec::new();

    for bib_entry in bibliography.into_iter() {
        let mut paper = Paper::new(bib_entry.key.clone());

        if let Ok(title_chunks) = bib_entry.title() {
            paper.title = Some(title_chunks.format_verbatim());
        }

        if let Ok(authors) = bib_entry.author() {
            paper.authors = authors
                .iter()
                .map(|person| {
                    if person.given_name.is_empty() {
                        person.name.clone()
                    } else {
                        format!("{}, {}", person.name, person.given_name)
                    }
                })
                .collect();
        }

        if let Some(year_chunks) = bib_entry.get("year") {
            paper.year = year_chunks.format_verbatim().trim().parse().ok();
        }

        if let Ok(doi) = bib_entry.doi() {
            paper.doi = Some(doi.trim().to_string());
        } else if let Ok(url) = bib_entry.url() {
            paper.doi = extract_doi_from_url(&url);
        }

        paper.pmid = raw_field(&bib_entry, &["pmid"]);
        paper.ut = raw_field(&bib_entry, &["ut", "isi", "wos"])
            .map(|ut| ut.trim_start_matches("WOS:").to_string());

        papers.push(paper);
    }

    Ok(papers)
}

/// First non-empty value among the named raw fields
fn raw_field(entry: &biblatex::Entry, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| entry.get(name))
        .map(|chunks| chunks.format_verbatim().trim().to_string())
        .find(|value| !value.is_empty())
}

/// Extract DOI from a URL
fn extract_doi_from_url(url: &str) -> Option<String> {
    // https://doi.org/10.1234/example
    // https://dx.doi.org/10.1234/example
    let idx = url.find("doi.org/")?;
    let doi = &url[idx + 8..];
    if doi.starts_with("10.") {
        Some(doi.to_string())
    } else {
        None
    }
}
