use std::collections::HashMap;

use crate::docx::document::TemplateDocument;
use crate::docx::xml::{verify_structure_unchanged, XmlEvent};
use crate::error::MergeError;
use crate::mapping::MappingStore;
use crate::render::render_row;
use crate::scan::BracketStyle;
use crate::tabular::DataTable;

/// Safety valve against unbounded work: rows beyond the limit are truncated,
/// not an error.
pub const DEFAULT_ROW_LIMIT: usize = 100;

/// Merge every data row into one document: the template body is rendered
/// once per row and the copies are joined with page breaks, one fewer than
/// the number of rows. The template's trailing section properties are kept
/// exactly once, after the last copy. The source document is not mutated;
/// any row failure aborts the whole composition with no partial output.
pub fn compose(
    doc: &TemplateDocument,
    store: &MappingStore,
    styles: &[BracketStyle],
    table: &DataTable,
    row_limit: usize,
) -> Result<Vec<u8>, MergeError> {
    if table.rows.is_empty() {
        return Err(MergeError::EmptyDataSet);
    }
    let limit = row_limit.max(1);
    let row_count = table.rows.len().min(limit);

    let (start, end) = doc.body_span()?;
    let events = &doc.document_part().events;
    let body = &events[start..end];
    let (content, tail) = split_trailing_sect_pr(body);

    let mut out: Vec<XmlEvent> = events[..start].to_vec();
    for i in 0..row_count {
        if i > 0 {
            out.extend(page_break_events());
        }
        let values = table.row_map(i);
        let rendered =
            render_row(content, store, styles, &values).map_err(|e| MergeError::RenderFailed {
                row: i,
                reason: e.to_string(),
            })?;
        out.extend(rendered);
    }
    out.extend_from_slice(tail);
    out.extend_from_slice(&events[end..]);

    // Rendering works on copies; the source part must still hash clean.
    verify_structure_unchanged(doc.document_part())?;
    doc.serialize_with_document(out)
}

/// Fill one template from a single row's values, no page breaks. Used when
/// several independent templates are each filled once; bundling the
/// resulting artifacts is the caller's concern.
pub fn fill_single(
    doc: &TemplateDocument,
    store: &MappingStore,
    styles: &[BracketStyle],
    values: &HashMap<String, String>,
) -> Result<Vec<u8>, MergeError> {
    let (start, end) = doc.body_span()?;
    let events = &doc.document_part().events;
    let body = &events[start..end];
    let (content, tail) = split_trailing_sect_pr(body);

    let rendered =
        render_row(content, store, styles, values).map_err(|e| MergeError::RenderFailed {
            row: 0,
            reason: e.to_string(),
        })?;

    let mut out: Vec<XmlEvent> = events[..start].to_vec();
    out.extend(rendered);
    out.extend_from_slice(tail);
    out.extend_from_slice(&events[end..]);
    verify_structure_unchanged(doc.document_part())?;
    doc.serialize_with_document(out)
}

/// `<w:p><w:r><w:br w:type="page"/></w:r></w:p>`
fn page_break_events() -> Vec<XmlEvent> {
    vec![
        XmlEvent::Start {
            name: "w:p".to_string(),
            attrs: Vec::new(),
        },
        XmlEvent::Start {
            name: "w:r".to_string(),
            attrs: Vec::new(),
        },
        XmlEvent::Empty {
            name: "w:br".to_string(),
            attrs: vec![("w:type".to_string(), "page".to_string())],
        },
        XmlEvent::End {
            name: "w:r".to_string(),
        },
        XmlEvent::End {
            name: "w:p".to_string(),
        },
    ]
}

/// Split the body into cloneable content and the document-final `w:sectPr`
/// subtree. Only a trailing, body-level `sectPr` is held back; section
/// properties buried inside paragraphs travel with their row copy.
fn split_trailing_sect_pr(body: &[XmlEvent]) -> (&[XmlEvent], &[XmlEvent]) {
    let mut depth = 0usize;
    let mut last_top_level: Option<usize> = None;
    for (idx, ev) in body.iter().enumerate() {
        match ev {
            XmlEvent::Start { .. } => {
                if depth == 0 {
                    last_top_level = Some(idx);
                }
                depth += 1;
            }
            XmlEvent::End { .. } => depth = depth.saturating_sub(1),
            _ => {
                if depth == 0 {
                    last_top_level = Some(idx);
                }
            }
        }
    }
    if let Some(idx) = last_top_level {
        let is_sect_pr = matches!(
            &body[idx],
            XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. } if name == "w:sectPr"
        );
        if is_sect_pr {
            return body.split_at(idx);
        }
    }
    (body, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::XmlEvent;
    use crate::scan::{default_styles, scan, ScanReport};
    use crate::testutil::doc_from_body;

    fn store(pairs: &[(&str, &str)]) -> MappingStore {
        let mut s = MappingStore::default();
        for (p, c) in pairs {
            s.set(p, c);
        }
        s
    }

    fn reload(bytes: &[u8]) -> TemplateDocument {
        TemplateDocument::load("merged", bytes).expect("reload merged output")
    }

    fn page_break_count(doc: &TemplateDocument) -> usize {
        doc.document_part()
            .events
            .iter()
            .filter(|ev| {
                matches!(
                    ev,
                    XmlEvent::Empty { name, attrs }
                        if name == "w:br"
                            && attrs.iter().any(|(k, v)| k == "w:type" && v == "page")
                )
            })
            .count()
    }

    fn sect_pr_count(doc: &TemplateDocument) -> usize {
        doc.document_part()
            .events
            .iter()
            .filter(|ev| {
                matches!(
                    ev,
                    XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. }
                        if name == "w:sectPr"
                )
            })
            .count()
    }

    fn body_texts(doc: &TemplateDocument) -> Vec<String> {
        doc.body_events()
            .expect("body")
            .iter()
            .filter_map(|ev| match ev {
                XmlEvent::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn names_table(n: usize) -> DataTable {
        DataTable::new(
            vec!["name".to_string()],
            (0..n).map(|i| vec![format!("person-{i}")]).collect(),
        )
    }

    #[test]
    fn empty_data_set_is_rejected_outright() {
        let doc = doc_from_body("<w:p><w:r><w:t>{{Name}}</w:t></w:r></w:p>");
        let err = compose(
            &doc,
            &store(&[("Name", "name")]),
            &default_styles(),
            &DataTable::new(vec!["name".to_string()], vec![]),
            DEFAULT_ROW_LIMIT,
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::EmptyDataSet));
    }

    #[test]
    fn page_breaks_are_one_fewer_than_rows() {
        let doc = doc_from_body("<w:p><w:r><w:t>{{Name}}</w:t></w:r></w:p>");
        for n in [1usize, 2, 5] {
            let bytes = compose(
                &doc,
                &store(&[("Name", "name")]),
                &default_styles(),
                &names_table(n),
                DEFAULT_ROW_LIMIT,
            )
            .expect("compose");
            let merged = reload(&bytes);
            assert_eq!(page_break_count(&merged), n - 1, "rows={n}");
        }
    }

    #[test]
    fn excess_rows_truncate_to_the_limit() {
        let doc = doc_from_body("<w:p><w:r><w:t>Row {{Name}}</w:t></w:r></w:p>");
        let bytes = compose(
            &doc,
            &store(&[("Name", "name")]),
            &default_styles(),
            &names_table(150),
            100,
        )
        .expect("compose");
        let merged = reload(&bytes);
        let texts = body_texts(&merged);
        let sections = texts.iter().filter(|t| t.starts_with("Row ")).count();
        assert_eq!(sections, 100);
        assert_eq!(page_break_count(&merged), 99);
        assert!(texts.iter().any(|t| t.contains("person-99")));
        assert!(!texts.iter().any(|t| t.contains("person-100")));
    }

    #[test]
    fn trailing_section_properties_survive_exactly_once() {
        let doc = doc_from_body("<w:p><w:r><w:t>{{Name}}</w:t></w:r></w:p>");
        let bytes = compose(
            &doc,
            &store(&[("Name", "name")]),
            &default_styles(),
            &names_table(4),
            DEFAULT_ROW_LIMIT,
        )
        .expect("compose");
        let merged = reload(&bytes);
        assert_eq!(sect_pr_count(&merged), 1);
        // And it is the last body-level element.
        let body = merged.body_events().expect("body");
        let (_, tail) = split_trailing_sect_pr(body);
        assert!(!tail.is_empty());
    }

    #[test]
    fn two_row_merge_renders_both_sections_in_order() {
        let doc = doc_from_body(
            "<w:p><w:r><w:t>Name: {{Name}}</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Amount: {{Amount}}</w:t></w:r></w:p>",
        );
        let table = DataTable::new(
            vec!["Name".to_string(), "Amount".to_string()],
            vec![
                vec!["Alice".to_string(), "100".to_string()],
                vec!["Bob".to_string(), "200".to_string()],
            ],
        );
        let bytes = compose(
            &doc,
            &store(&[("Name", "Name"), ("Amount", "Amount")]),
            &default_styles(),
            &table,
            DEFAULT_ROW_LIMIT,
        )
        .expect("compose");
        let merged = reload(&bytes);
        assert_eq!(page_break_count(&merged), 1);
        let joined = body_texts(&merged).join("|");
        let alice = joined.find("Name: Alice").expect("alice section");
        let bob = joined.find("Name: Bob").expect("bob section");
        assert!(alice < bob);
        assert!(joined.contains("Amount: 100"));
        assert!(joined.contains("Amount: 200"));
        assert!(!joined.contains("{{"));
    }

    #[test]
    fn source_document_is_not_mutated_by_composition() {
        let doc = doc_from_body(
            "<w:p><w:bookmarkStart w:id=\"1\" w:name=\"Acct\"/>\
             <w:r><w:t>x</w:t></w:r><w:bookmarkEnd w:id=\"1\"/>\
             <w:r><w:t>{{Name}}</w:t></w:r></w:p>",
        );
        let styles = default_styles();
        let snapshot = |r: &ScanReport| -> Vec<String> {
            r.all().map(|p| p.name.clone()).collect()
        };
        let before = snapshot(&scan(&doc, &styles).expect("scan before"));
        for _ in 0..3 {
            compose(
                &doc,
                &store(&[("Name", "name"), ("Acct", "name")]),
                &styles,
                &names_table(2),
                DEFAULT_ROW_LIMIT,
            )
            .expect("compose");
        }
        let after = snapshot(&scan(&doc, &styles).expect("scan after"));
        assert_eq!(before, after);
    }

    #[test]
    fn row_failure_aborts_the_whole_batch() {
        // Unterminated bookmark makes every render fail.
        let doc = doc_from_body(
            "<w:p><w:bookmarkStart w:id=\"7\" w:name=\"Broken\"/>\
             <w:r><w:t>{{Name}}</w:t></w:r></w:p>",
        );
        let err = compose(
            &doc,
            &store(&[("Name", "name"), ("Broken", "name")]),
            &default_styles(),
            &names_table(3),
            DEFAULT_ROW_LIMIT,
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::RenderFailed { row: 0, .. }));
    }

    #[test]
    fn fill_single_produces_no_page_breaks() {
        let doc = doc_from_body("<w:p><w:r><w:t>{{Name}}</w:t></w:r></w:p>");
        let values = names_table(1).row_map(0);
        let bytes = fill_single(&doc, &store(&[("Name", "name")]), &default_styles(), &values)
            .expect("fill");
        let merged = reload(&bytes);
        assert_eq!(page_break_count(&merged), 0);
        assert!(body_texts(&merged).join("").contains("person-0"));
    }
}
