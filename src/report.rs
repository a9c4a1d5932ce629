use crate::papers::Paper;
use crate::record::{ArticleRecord, CitationRecord, IdType};
use colored::Colorize;
use serde::Serialize;

/// Citation counts for a list of papers
#[derive(Debug, Default, Serialize)]
pub struct CitationReport {
    pub id_type: Option<IdType>,
    pub rows: Vec<CitationRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationRow {
    pub key: String,
    pub title: Option<String>,
    pub status: RowStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    /// The service knows the paper
    Found { times_cited: Option<u32> },
    /// The service has no paper for the identifier
    NotFound,
    /// The paper has no identifier of the requested type
    NoIdentifier,
}

impl CitationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report from batch results; `results[i]` belongs to the i-th paper that has an identifier
    pub fn from_batch(papers: &[Paper], id_type: IdType, results: &[Option<CitationRecord>]) -> Self {
        let mut results = results.iter();
        let rows = papers
            .iter()
            .map(|paper| {
                let status = match paper.id(id_type) {
                    None => RowStatus::NoIdentifier,
                    Some(_) => match results.next() {
                        Some(Some(record)) => RowStatus::Found {
                            times_cited: record.times_cited(),
                        },
                        _ => RowStatus::NotFound,
                    },
                };
                CitationRow {
                    key: paper.key.clone(),
                    title: paper.title.clone(),
                    status,
                }
            })
            .collect();
        Self {
            id_type: Some(id_type),
            rows,
        }
    }

    /// Build a report from scraped records already matched to papers
    pub fn from_matches(papers: &[Paper], matches: &[Option<&ArticleRecord>]) -> Self {
        let rows = papers
            .iter()
            .zip(matches)
            .map(|(paper, matched)| CitationRow {
                key: paper.key.clone(),
                title: paper.title.clone(),
                status: match matched {
                    Some(record) => RowStatus::Found {
                        times_cited: record.times_cited,
                    },
                    None => RowStatus::NotFound,
                },
            })
            .collect();
        Self { id_type: None, rows }
    }

    pub fn count_found(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.status, RowStatus::Found { .. }))
            .count()
    }

    pub fn count_not_found(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.status, RowStatus::NotFound))
            .count()
    }

    pub fn count_without_id(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.status, RowStatus::NoIdentifier))
            .count()
    }

    /// Print the report to stdout with colors
    pub fn print(&self) {
        println!();
        println!("{}", "wokharvest Report".bold());
        println!("{}", "=".repeat(50));
        println!();

        println!("Processed: {} papers", self.rows.len());
        println!(
            "  {} found, {} not found, {} without {}",
            self.count_found().to_string().green(),
            self.count_not_found().to_string().yellow(),
            self.count_without_id().to_string().dimmed(),
            self.id_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "title".to_string())
        );
        println!();

        for row in &self.rows {
            let title = truncate(row.title.as_deref().unwrap_or("(no title)"), 60);
            let status = match &row.status {
                RowStatus::Found {
                    times_cited: Some(n),
                } => format!("{:>6}", n).green(),
                RowStatus::Found { times_cited: None } => format!("{:>6}", "?").green(),
                RowStatus::NotFound => format!("{:>6}", "-").yellow(),
                RowStatus::NoIdentifier => format!("{:>6}", "n/a").dimmed(),
            };
            println!("  {} {} {}", status, format!("[{}]", row.key).dimmed(), title);
        }
    }
}

/// Print scraped search results, one line each
pub fn print_articles(records: &[ArticleRecord], pages: u32) {
    println!(
        "{} records from {} page(s)",
        records.len().to_string().bold(),
        pages
    );
    for record in records {
        let cited = record
            .times_cited
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {:>6} {} {}",
            cited.green(),
            record.year.map(|y| y.to_string()).unwrap_or_default().dimmed(),
            truncate(record.title.as_deref().unwrap_or("(no title)"), 70)
        );
        if let Some(author) = &record.first_author {
            println!("         {}", author.dimmed());
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len - 3).collect();
        format!("{}...", cut)
    }
}
