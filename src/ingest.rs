//! Record-file ingestion: a line scanner over the flat export format.
//!
//! Records are delimited by recurring field markers:
//!
//! ```text
//! NAMES: Karin Johansson, Nisse Johansson
//! TITLE: A randomized study ...
//! ABSTRACT: We compared manual ...
//! NAME: ...
//! ```
//!
//! A `NAME:`/`NAMES:` marker closes the previous record and opens a new
//! one. Parsing is deliberately permissive: malformed or incomplete
//! records are dropped silently.

use anyhow::{Context, Result};
use std::path::Path;

use crate::models::Document;

/// Abstracts equal to these placeholders are treated as missing and fall
/// back to the title.
const ABSTRACT_PLACEHOLDERS: &[&str] = &["no abstract", "[abstract missing]"];

/// Parse a record file into documents. Ids are assigned sequentially as
/// `ID000000`, `ID000001`, ….
pub fn parse_records_file(path: &Path) -> Result<Vec<Document>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record file {}", path.display()))?;
    Ok(parse_records(&text))
}

pub fn parse_records(text: &str) -> Vec<Document> {
    let mut documents = Vec::new();
    let mut current = PartialRecord::default();

    for line in text.lines() {
        let line = line.trim();

        if let Some(name) = marker_value(line, &["NAME:", "NAMES:"]) {
            // A new name closes the previous record.
            current.finish_into(&mut documents);
            current.name = Some(name.to_string());
        } else if let Some(title) = marker_value(line, &["TITLE:"]) {
            if current.title.is_none() {
                current.title = Some(title.to_string());
            }
        } else if let Some(abstract_text) = marker_value(line, &["ABSTRACT:"]) {
            match &mut current.abstract_text {
                // A second "ABSTRACT:" means the text itself contained
                // the marker; append the whole line.
                Some(existing) => {
                    existing.push(' ');
                    existing.push_str(line);
                }
                None => current.abstract_text = Some(abstract_text.to_string()),
            }
        }
        // Lines without a known marker are ignored.
    }
    // Left-over record at EOF.
    current.finish_into(&mut documents);

    documents
}

/// Strip a matching marker prefix and return the value after the first ':'.
fn marker_value<'a>(line: &'a str, markers: &[&str]) -> Option<&'a str> {
    for marker in markers {
        if line.starts_with(marker) {
            return line.split_once(':').map(|(_, v)| v.trim());
        }
    }
    None
}

#[derive(Default)]
struct PartialRecord {
    name: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
}

impl PartialRecord {
    /// Close this record: apply the title fallback for missing or
    /// placeholder abstracts, emit a document when name, title and content
    /// are all present, and reset. Incomplete records are dropped without
    /// a report.
    fn finish_into(&mut self, documents: &mut Vec<Document>) {
        let name = self.name.take();
        let title = self.title.take();
        let abstract_text = self.abstract_text.take();

        let (name, title, abstract_text) = match (name, title, abstract_text) {
            (Some(n), Some(t), Some(a)) => (n, t, a),
            _ => return,
        };

        let content = if abstract_text.len() >= 2
            && !ABSTRACT_PLACEHOLDERS.contains(&abstract_text.as_str())
        {
            abstract_text
        } else {
            // Short or placeholder abstract: mirror the title.
            title.clone()
        };
        if content.is_empty() {
            return;
        }

        let id = format!("ID{:06}", documents.len());
        documents.push(
            Document::new(id, content.clone())
                .with_meta("researcher_name", name)
                .with_meta("title", title)
                .with_meta("abstract", content),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_records() {
        let text = "\
NAME: P. Berck
TITLE: Lichen studies
ABSTRACT: Lichen grows on rocks and trees.
NAMES: A. Katz, B. Hund
TITLE: Animal work
ABSTRACT: Cats and dogs in the field.
";
        let docs = parse_records(text);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "ID000000");
        assert_eq!(docs[0].researcher_name().unwrap(), "P. Berck");
        assert_eq!(docs[0].content, "Lichen grows on rocks and trees.");
        assert_eq!(docs[1].id, "ID000001");
        assert_eq!(docs[1].content, "Cats and dogs in the field.");
    }

    #[test]
    fn test_short_abstract_falls_back_to_title() {
        let text = "\
NAME: X
TITLE: The actual title
ABSTRACT: .
";
        let docs = parse_records(text);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "The actual title");
    }

    #[test]
    fn test_placeholder_abstract_falls_back_to_title() {
        for placeholder in ["no abstract", "[abstract missing]"] {
            let text = format!("NAME: X\nTITLE: T\nABSTRACT: {placeholder}\n");
            let docs = parse_records(&text);
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].content, "T");
        }
    }

    #[test]
    fn test_record_missing_title_dropped_silently() {
        let text = "\
NAME: X
ABSTRACT: Some text without a title.
NAME: Y
TITLE: Good record
ABSTRACT: Complete.
";
        let docs = parse_records(text);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].researcher_name().unwrap(), "Y");
    }

    #[test]
    fn test_record_without_abstract_line_dropped() {
        let text = "\
NAME: X
TITLE: Only a title
NAME: Y
TITLE: Full record
ABSTRACT: Complete text.
";
        let docs = parse_records(text);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Complete text.");
    }

    #[test]
    fn test_trailing_incomplete_record_dropped() {
        let text = "\
NAME: X
TITLE: Done
ABSTRACT: Finished text here.
NAME: Y
";
        let docs = parse_records(text);
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_abstract_containing_abstract_marker_appends() {
        let text = "\
NAME: X
TITLE: T
ABSTRACT: First part.
ABSTRACT: embedded marker line
NAME: Y
TITLE: U
ABSTRACT: Other text entirely.
";
        let docs = parse_records(text);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].content.contains("First part."));
        assert!(docs[0].content.contains("ABSTRACT: embedded marker line"));
    }

    #[test]
    fn test_unmarked_lines_are_ignored() {
        let text = "\
NAME: X
TITLE: T
ABSTRACT: First line
stray line without a marker
another one
NAME: Y
TITLE: U
ABSTRACT: Other.
";
        let docs = parse_records(text);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "First line");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_records("").is_empty());
    }

    #[test]
    fn test_ids_are_sequential() {
        let text = "\
NAME: A
TITLE: T1
ABSTRACT: Text one here.
NAME: B
TITLE: T2
ABSTRACT: Text two here.
NAME: C
TITLE: T3
ABSTRACT: Text three here.
";
        let docs = parse_records(text);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["ID000000", "ID000001", "ID000002"]);
    }
}
