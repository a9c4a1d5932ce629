use crate::papers::Paper;
use crate::record::{normalize_string, ArticleRecord};
use strsim::jaro_winkler;

/// Threshold for title similarity (0.0 to 1.0)
const TITLE_MATCH_THRESHOLD: f64 = 0.85;

/// Title similarity between a paper and a scraped record
pub fn title_similarity(paper: &Paper, record: &ArticleRecord) -> f64 {
    match (&paper.title, &record.title) {
        (Some(a), Some(b)) => jaro_winkler(&normalize_string(a), &normalize_string(b)),
        _ => 0.0,
    }
}

/// Pair every paper with the scraped record whose title is closest to its own.
///
/// A query ORs many titles together, so results come back in the portal's
/// order; this puts them back against the papers that were asked for.
pub fn match_articles<'a>(
    papers: &[Paper],
    records: &'a [ArticleRecord],
) -> Vec<Option<&'a ArticleRecord>> {
    papers
        .iter()
        .map(|paper| {
            records
                .iter()
                .map(|record| (record, title_similarity(paper, record)))
                .filter(|(_, sim)| *sim >= TITLE_MATCH_THRESHOLD)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(record, _)| record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(title: &str) -> Paper {
        let mut paper = Paper::new("k");
        paper.title = Some(title.to_string());
        paper
    }

    fn record(title: &str, cited: u32) -> ArticleRecord {
        ArticleRecord {
            title: Some(title.to_string()),
            times_cited: Some(cited),
            ..ArticleRecord::default()
        }
    }

    #[test]
    fn test_records_matched_back_to_papers() {
        let papers = vec![
            paper("Deep Learning for Image Classification"),
            paper("Quantum Computing in Finance"),
            paper("Something never found"),
        ];
        let records = vec![
            record("QUANTUM COMPUTING IN FINANCE", 4),
            record("Deep learning for image classification.", 90),
        ];

        let matched = match_articles(&papers, &records);
        assert_eq!(matched[0].and_then(|r| r.times_cited), Some(90));
        assert_eq!(matched[1].and_then(|r| r.times_cited), Some(4));
        assert!(matched[2].is_none());
    }
}
