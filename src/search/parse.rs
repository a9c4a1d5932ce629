//! Extraction of page counts, query IDs and result items from summary pages.

use crate::record::ArticleRecord;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PAGE_COUNT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"span[id="pageCount.top"]"#).expect("valid selector"));
static RESULT_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.search-results-item").expect("valid selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static VALUE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("value").expect("valid selector"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").expect("valid selector"));
static CITE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.search-results-data-cite").expect("valid selector"));

// Links on a summary page carry the query ID as `&qid=<n>&`, HTML-escaped or not.
static QUERY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:amp;)?qid=(\d+)&").expect("valid regex"));

/// Text of every page count element on the page; normally exactly one
pub fn page_counts(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&PAGE_COUNT)
        .map(|e| collapse(&element_text(e)))
        .collect()
}

/// The page count, when the page has exactly one and it is an integer
pub fn page_count(html: &str) -> Option<u32> {
    match page_counts(html).as_slice() {
        [count] => count.parse().ok(),
        _ => None,
    }
}

/// Distinct query IDs linked from the page, ascending
pub fn query_ids(html: &str) -> Vec<u64> {
    QUERY_ID
        .captures_iter(html)
        .filter_map(|cap| cap[1].parse().ok())
        .collect::<BTreeSet<u64>>()
        .into_iter()
        .collect()
}

/// One record per search result item, in page order
pub fn result_items(html: &str) -> Vec<ArticleRecord> {
    let document = Html::parse_document(html);
    document.select(&RESULT_ITEM).map(parse_article).collect()
}

/// Extract what can be found about one result item
pub fn parse_article(item: ElementRef<'_>) -> ArticleRecord {
    let spans: Vec<ElementRef<'_>> = item.select(&SPAN).collect();

    ArticleRecord {
        title: title(item),
        first_author: first_author(&spans),
        volume: labelled(&spans, "Volume:").map(|v| clean_volume(&v)),
        pages: labelled(&spans, "Pages:"),
        article_number: labelled(&spans, "Article Number:"),
        year: labelled(&spans, "Published:").and_then(|date| parse_year(&date)),
        times_cited: times_cited(item),
    }
}

/// First `<value>` inside the first link
fn title(item: ElementRef<'_>) -> Option<String> {
    let link = item.select(&LINK).next()?;
    let value = link.select(&VALUE).next()?;
    let text = collapse(&element_text(value));
    (!text.is_empty()).then_some(text)
}

/// Authors are listed in the parent of the "By:" label; keep the first one
fn first_author(spans: &[ElementRef<'_>]) -> Option<String> {
    let label = spans
        .iter()
        .find(|span| element_text(**span).trim_start().starts_with("By:"))?;
    let parent = label.parent().and_then(ElementRef::wrap)?;
    let text = collapse(&element_text(parent));
    let author = text
        .trim_start_matches("By:")
        .split(';')
        .next()?
        .trim()
        .to_string();
    (!author.is_empty()).then_some(author)
}

/// Text of the span right after the span labelled `label`
fn labelled(spans: &[ElementRef<'_>], label: &str) -> Option<String> {
    let position = spans
        .iter()
        .position(|span| element_text(*span).trim_start().starts_with(label))?;
    let value = collapse(&element_text(*spans.get(position + 1)?));
    (!value.is_empty()).then_some(value)
}

/// Lowercase, without a supplement suffix ("18 Suppl 1" is volume "18")
fn clean_volume(volume: &str) -> String {
    let volume = volume.to_lowercase();
    match volume.split_once("suppl") {
        Some((number, _)) => number.trim().to_string(),
        None => volume,
    }
}

/// The year is usually the last word of the date ("JAN 2013"), sometimes the
/// first ("2013 JAN") and occasionally ISO-like ("2013-01-05").
fn parse_year(date: &str) -> Option<i32> {
    let four_digits = |s: &str| -> Option<i32> {
        let year: i32 = s.parse().ok()?;
        (year.to_string().len() == 4).then_some(year)
    };

    date.split_whitespace()
        .last()
        .and_then(four_digits)
        .or_else(|| {
            date.split_whitespace()
                .next()
                .and_then(|first| first.split('-').next())
                .and_then(four_digits)
        })
}

/// "Times Cited: 1,204 (from All Databases)"
fn times_cited(item: ElementRef<'_>) -> Option<u32> {
    let mut cites = item.select(&CITE);
    let cite = cites.next()?;
    if cites.next().is_some() {
        return None;
    }

    let text = collapse(&element_text(cite));
    if !text.contains("from All Databases") {
        return None;
    }
    let count = text.strip_prefix("Times Cited:")?.split('(').next()?;
    count.replace(',', "").trim().parse().ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = r#"
        <div class="search-results-item">
          <div class="search-results-content">
            <div><a class="smallV110" href="/full_record.do?product=UA&amp;qid=3&amp;SID=X&amp;doc=1">
              <value>Electronic   structure of
                 <b>graphene</b></value></a></div>
            <div><span class="label">By: </span>Smith, J.; Doe, J.; Roe, R.</div>
            <div>
              <span class="label">Volume: </span><span class="data_bold"><value>18 Suppl 1</value></span>
              <span class="label">Pages: </span><span class="data_bold"><value>101-110</value></span>
              <span class="label">Published: </span><span class="data_bold"><value>MAR 2013</value></span>
            </div>
          </div>
          <div class="search-results-data-cite">Times Cited: 1,204
            (from All Databases)</div>
        </div>"#;

    fn parse_one(html: &str) -> ArticleRecord {
        let mut records = result_items(&format!("<html><body>{}</body></html>", html));
        assert_eq!(records.len(), 1);
        records.remove(0)
    }

    #[test]
    fn test_parse_full_item() {
        let record = parse_one(ITEM);
        assert_eq!(record.title.as_deref(), Some("Electronic structure of graphene"));
        assert_eq!(record.first_author.as_deref(), Some("Smith, J."));
        assert_eq!(record.volume.as_deref(), Some("18"));
        assert_eq!(record.pages.as_deref(), Some("101-110"));
        assert_eq!(record.article_number, None);
        assert_eq!(record.year, Some(2013));
        assert_eq!(record.times_cited, Some(1204));
    }

    #[test]
    fn test_missing_fields_do_not_spoil_the_rest() {
        let html = r##"<div class="search-results-item">
            <a href="#"><value>Only a title</value></a>
            <span>Article Number: </span><span>e1002</span>
            <span>Published: </span><span>2011-05-03</span>
            <div class="search-results-data-cite">Times Cited: 0</div>
        </div>"##;
        let record = parse_one(html);
        assert_eq!(record.title.as_deref(), Some("Only a title"));
        assert_eq!(record.article_number.as_deref(), Some("e1002"));
        assert_eq!(record.year, Some(2011));
        assert_eq!(record.first_author, None);
        assert_eq!(record.volume, None);
        assert_eq!(record.times_cited, None);
    }

    #[test]
    fn test_year_formats() {
        assert_eq!(parse_year("DEC 15 2009"), Some(2009));
        assert_eq!(parse_year("2009 DEC"), Some(2009));
        assert_eq!(parse_year("2009-12-15"), Some(2009));
        assert_eq!(parse_year("SPR 09"), None);
    }

    #[test]
    fn test_page_count_must_be_single_integer() {
        let one = r#"<span id="pageCount.top">3</span>"#;
        let two = r#"<span id="pageCount.top">3</span><span id="pageCount.top">3</span>"#;
        let mangled = r#"<span id="pageCount.top">3<b>x</b></span>"#;
        assert_eq!(page_count(one), Some(3));
        assert_eq!(page_count(two), None);
        assert_eq!(page_count(mangled), None);
        assert_eq!(page_count("<p>no results</p>"), None);
    }

    #[test]
    fn test_query_ids_are_distinct() {
        let html = r#"<a href="a?x=1&qid=12&SID=S">a</a><a href="b?y=2&amp;qid=12&amp;p=1">b</a>"#;
        assert_eq!(query_ids(html), vec![12]);

        let html = r#"<a href="a?x=1&qid=12&SID=S">a</a><a href="b?y=2&qid=13&p=1">b</a>"#;
        assert_eq!(query_ids(html), vec![12, 13]);
        assert!(query_ids("<p>none</p>").is_empty());
    }
}
