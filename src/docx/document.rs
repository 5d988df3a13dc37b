use std::collections::HashMap;
use std::path::Path;

use crate::docx::package::{DocxPackage, DOCUMENT_PART};
use crate::docx::xml::{parse_xml_part, write_xml_part, XmlEvent, XmlPart};
use crate::error::MergeError;

/// A loaded template: the whole package plus the parsed main document part.
/// Only `word/document.xml` is parsed; every other part rides along untouched
/// and is re-emitted verbatim at serialization.
#[derive(Debug)]
pub struct TemplateDocument {
    pub name: String,
    package: DocxPackage,
    document: XmlPart,
}

impl TemplateDocument {
    pub fn load(name: &str, bytes: &[u8]) -> Result<Self, MergeError> {
        let package = DocxPackage::read_bytes(bytes)?;
        let entry = package.entry(DOCUMENT_PART).ok_or_else(|| {
            MergeError::MalformedDocument(format!("{name}: missing {DOCUMENT_PART}"))
        })?;
        let document = parse_xml_part(DOCUMENT_PART, &entry.data)?;
        Ok(Self {
            name: name.to_string(),
            package,
            document,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, MergeError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        let bytes = std::fs::read(path)
            .map_err(|e| MergeError::CorruptPackage(format!("{}: {e}", path.display())))?;
        Self::load(&name, &bytes)
    }

    pub fn document_part(&self) -> &XmlPart {
        &self.document
    }

    /// Event range strictly inside `<w:body>`: `(first_child, end_index)`.
    pub fn body_span(&self) -> Result<(usize, usize), MergeError> {
        let events = &self.document.events;
        let start = events
            .iter()
            .position(|ev| matches!(ev, XmlEvent::Start { name, .. } if name == "w:body"))
            .ok_or_else(|| {
                MergeError::MalformedDocument(format!("{}: no w:body element", self.name))
            })?;
        let mut depth = 0usize;
        for (idx, ev) in events.iter().enumerate().skip(start + 1) {
            match ev {
                XmlEvent::Start { name, .. } if name == "w:body" => depth += 1,
                XmlEvent::End { name } if name == "w:body" => {
                    if depth == 0 {
                        return Ok((start + 1, idx));
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        Err(MergeError::MalformedDocument(format!(
            "{}: unterminated w:body",
            self.name
        )))
    }

    pub fn body_events(&self) -> Result<&[XmlEvent], MergeError> {
        let (start, end) = self.body_span()?;
        Ok(&self.document.events[start..end])
    }

    /// Names of all bookmark anchors in the document part, first-seen order,
    /// deduplicated. Word's own `_GoBack` cursor bookmark is not a field.
    pub fn bookmark_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for ev in &self.document.events {
            let (name, attrs) = match ev {
                XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => (name, attrs),
                _ => continue,
            };
            if name != "w:bookmarkStart" {
                continue;
            }
            if let Some((_, v)) = attrs.iter().find(|(k, _)| k == "w:name") {
                if v == "_GoBack" || names.iter().any(|n| n == v) {
                    continue;
                }
                names.push(v.clone());
            }
        }
        names
    }

    /// Re-serialize the package with the document part replaced by `events`.
    /// All other parts (styles, numbering, media, section properties living
    /// outside the body) pass through exactly once, byte-for-byte.
    pub fn serialize_with_document(&self, events: Vec<XmlEvent>) -> Result<Vec<u8>, MergeError> {
        let part = XmlPart {
            name: DOCUMENT_PART.to_string(),
            events,
            baseline_hash: String::new(),
        };
        let bytes = write_xml_part(&part)?;
        let mut replacements = HashMap::new();
        replacements.insert(DOCUMENT_PART.to_string(), bytes);
        self.package.to_bytes_with(&replacements)
    }
}
