use super::FetchError;
use crate::record::CitationRecord;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

// Nesting of the interesting elements:
// response(1) > fn(2) > map(3) > map name="<index>"(4) > map name="WOS"(5) > val name="<field>"(6)
const FN_DEPTH: usize = 2;
const OUTER_MAP_DEPTH: usize = 3;
const PAPER_DEPTH: usize = 4;
const FIELD_DEPTH: usize = 6;

/// Parse a batch service response into records ordered by their request index.
///
/// Only the first map under the function node carries papers. Every index
/// from 0 up to the number of papers must be present.
pub fn parse_response(xml: &str) -> Result<Vec<CitationRecord>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut outer_seen = false;
    let mut in_outer = false;
    let mut papers: HashMap<String, CitationRecord> = HashMap::new();
    let mut current_paper: Option<(String, CitationRecord)> = None;
    let mut current_field: Option<String> = None;
    let mut field_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let name = local_name(e);

                match (depth, name.as_str()) {
                    (FN_DEPTH, "fn") => check_return_code(e)?,
                    (OUTER_MAP_DEPTH, "map") if !outer_seen => {
                        outer_seen = true;
                        in_outer = true;
                    }
                    (PAPER_DEPTH, "map") if in_outer => {
                        current_paper = Some((name_attribute(e)?, CitationRecord::new()));
                    }
                    (FIELD_DEPTH, "val") if in_outer && current_paper.is_some() => {
                        current_field = Some(name_attribute(e)?);
                        field_text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = local_name(e);
                if depth + 1 == PAPER_DEPTH && in_outer && name == "map" {
                    papers.insert(name_attribute(e)?, CitationRecord::new());
                }
            }
            Ok(Event::Text(ref e)) => {
                if current_field.is_some() {
                    let text = e
                        .unescape()
                        .map_err(|e| FetchError::Parse(format!("Bad text in response: {}", e)))?;
                    field_text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                if depth == FIELD_DEPTH {
                    if let (Some(field), Some((_, record))) =
                        (current_field.take(), current_paper.as_mut())
                    {
                        record.insert(field, field_text.trim());
                    }
                } else if depth == PAPER_DEPTH && in_outer {
                    if let Some((index, record)) = current_paper.take() {
                        papers.insert(index, record);
                    }
                } else if depth == OUTER_MAP_DEPTH && in_outer {
                    in_outer = false;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Parse(format!(
                    "Error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    (0..papers.len())
        .map(|i| {
            papers
                .remove(&i.to_string())
                .ok_or_else(|| FetchError::Parse(format!("Response has no paper with index {}", i)))
        })
        .collect()
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn name_attribute(e: &BytesStart<'_>) -> Result<String, FetchError> {
    let attr = e
        .try_get_attribute("name")
        .map_err(|err| FetchError::Parse(err.to_string()))?
        .ok_or_else(|| FetchError::Parse(format!("<{}> without a name", local_name(e))))?;
    attr.unescape_value()
        .map(|v| v.to_string())
        .map_err(|err| FetchError::Parse(err.to_string()))
}

fn check_return_code(e: &BytesStart<'_>) -> Result<(), FetchError> {
    let rc = e
        .try_get_attribute("rc")
        .map_err(|err| FetchError::Parse(err.to_string()))?;
    if let Some(rc) = rc {
        let code = rc
            .unescape_value()
            .map_err(|err| FetchError::Parse(err.to_string()))?;
        if code != "OK" {
            return Err(FetchError::Parse(format!("Service returned rc={}", code)));
        }
    }
    Ok(())
}
