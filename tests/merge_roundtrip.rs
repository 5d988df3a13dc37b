use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use docmerge::compose::{compose, DEFAULT_ROW_LIMIT};
use docmerge::docx::document::TemplateDocument;
use docmerge::docx::xml::XmlEvent;
use docmerge::mapping::MappingStore;
use docmerge::matching::auto_map;
use docmerge::scan::{default_styles, scan};
use docmerge::tabular::DataTable;

const CONTENT_TYPES: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
</Types>";

fn docx_bytes(body: &str) -> Vec<u8> {
    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr><w:pgSz w:w=\"11906\" w:h=\"16838\"/></w:sectPr></w:body>\
         </w:document>"
    );
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", opts).expect("start");
    zip.write_all(CONTENT_TYPES.as_bytes()).expect("write");
    zip.start_file("word/document.xml", opts).expect("start");
    zip.write_all(document.as_bytes()).expect("write");
    zip.finish().expect("finish").into_inner()
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

fn page_break_count(doc: &TemplateDocument) -> usize {
    doc.document_part()
        .events
        .iter()
        .filter(|ev| {
            matches!(
                ev,
                XmlEvent::Empty { name, attrs }
                    if name == "w:br" && attrs.iter().any(|(k, v)| k == "w:type" && v == "page")
            )
        })
        .count()
}

#[test]
fn scan_map_merge_round_trip() {
    let bytes = docx_bytes(
        "<w:p><w:r><w:t>Dear {{Name}},</w:t></w:r></w:p>\
         <w:p><w:r><w:t>you owe {{Amount}}.</w:t></w:r></w:p>",
    );
    let doc = TemplateDocument::load("invoice", &bytes).expect("load");
    let styles = default_styles();

    let report = scan(&doc, &styles).expect("scan");
    let names: Vec<&str> = report.placeholders.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Name", "Amount"]);

    let table = DataTable::new(
        vec!["Name".to_string(), "Amount".to_string()],
        vec![
            vec!["Alice".to_string(), "100".to_string()],
            vec!["Bob".to_string(), "200".to_string()],
        ],
    );

    let mut store = MappingStore::default();
    let mapped = auto_map(
        &report.all().map(|p| p.name.clone()).collect::<Vec<_>>(),
        &table.headers,
        &mut store,
    );
    assert_eq!(mapped.mapped_count(), 2);
    assert_eq!(mapped.needs_review().count(), 0);

    // Mapping survives its persistence boundary.
    let blob = store.to_json().expect("serialize mapping");
    let store = MappingStore::from_json(&blob).expect("restore mapping");

    let merged_bytes = compose(&doc, &store, &styles, &table, DEFAULT_ROW_LIMIT).expect("compose");
    let merged = TemplateDocument::load("merged", &merged_bytes).expect("reload");

    assert_eq!(page_break_count(&merged), 1);
    let joined = body_texts(&merged).join("|");
    let alice = joined.find("Dear Alice,").expect("first section");
    let bob = joined.find("Dear Bob,").expect("second section");
    assert!(alice < bob);
    assert!(joined.contains("you owe 100."));
    assert!(joined.contains("you owe 200."));
    assert!(!joined.contains("{{"));

    // The merged document carries no leftover tokens when re-scanned.
    let rescan = scan(&merged, &styles).expect("scan merged");
    assert_eq!(rescan.placeholders.len(), 0);

    // And the source template was never mutated by composition.
    let post = scan(&doc, &styles).expect("scan source again");
    let post_names: Vec<&str> = post.placeholders.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(post_names, vec!["Name", "Amount"]);
}

#[test]
fn markup_in_values_is_escaped_not_interpreted() {
    let bytes = docx_bytes("<w:p><w:r><w:t>{{Vendor}}</w:t></w:r></w:p>");
    let doc = TemplateDocument::load("po", &bytes).expect("load");
    let styles = default_styles();

    let mut store = MappingStore::default();
    store.set("Vendor", "vendor");
    let table = DataTable::new(
        vec!["vendor".to_string()],
        vec![vec!["Fish & <Chips> \"Ltd\"".to_string()]],
    );

    let merged_bytes = compose(&doc, &store, &styles, &table, DEFAULT_ROW_LIMIT).expect("compose");

    // Raw part bytes hold escaped markup, never a stray '<'.
    let merged = TemplateDocument::load("merged", &merged_bytes).expect("reload");
    let joined = body_texts(&merged).join("");
    assert_eq!(joined, "Fish & <Chips> \"Ltd\"");
}

#[test]
fn malformed_package_fails_at_the_load_boundary() {
    let err = TemplateDocument::load("junk", b"this is not a zip archive").unwrap_err();
    assert!(matches!(err, docmerge::MergeError::CorruptPackage(_)));

    // A valid archive without a document part is malformed, not corrupt.
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", opts).expect("start");
    zip.write_all(CONTENT_TYPES.as_bytes()).expect("write");
    let bytes = zip.finish().expect("finish").into_inner();
    let err = TemplateDocument::load("empty", &bytes).unwrap_err();
    assert!(matches!(err, docmerge::MergeError::MalformedDocument(_)));
}
