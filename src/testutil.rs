use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::docx::document::TemplateDocument;

const CONTENT_TYPES: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
</Types>";

pub(crate) fn docx_bytes(document_xml: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", opts)
        .expect("start content types");
    zip.write_all(CONTENT_TYPES.as_bytes())
        .expect("write content types");
    zip.start_file("word/document.xml", opts)
        .expect("start document part");
    zip.write_all(document_xml.as_bytes())
        .expect("write document part");
    zip.finish().expect("finish test zip").into_inner()
}

pub(crate) fn document_xml_with_body(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr><w:pgSz w:w=\"11906\" w:h=\"16838\"/></w:sectPr></w:body>\
         </w:document>"
    )
}

pub(crate) fn doc_from_document_xml(xml: &str) -> TemplateDocument {
    TemplateDocument::load("template", &docx_bytes(xml)).expect("load test docx")
}

pub(crate) fn doc_from_body(body: &str) -> TemplateDocument {
    doc_from_document_xml(&document_xml_with_body(body))
}
