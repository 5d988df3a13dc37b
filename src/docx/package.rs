use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::MergeError;

pub const DOCUMENT_PART: &str = "word/document.xml";

/// A DOCX package held entry-by-entry so it can be rewritten with selected
/// parts replaced and everything else carried through byte-for-byte.
#[derive(Debug)]
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

#[derive(Debug)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn read_bytes(bytes: &[u8]) -> Result<Self, MergeError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| MergeError::CorruptPackage(e.to_string()))?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| MergeError::CorruptPackage(format!("entry {i}: {e}")))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| MergeError::CorruptPackage(format!("read {}: {e}", file.name())))?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Rebuild the archive with the given entries replaced. Untouched entries
    /// keep their original bytes, compression method, timestamps and modes.
    pub fn to_bytes_with(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<Vec<u8>, MergeError> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .map_err(|e| MergeError::CorruptPackage(format!("dir {}: {e}", ent.name)))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .map_err(|e| MergeError::CorruptPackage(format!("file {}: {e}", ent.name)))?;
                zout.write_all(data)
                    .map_err(|e| MergeError::CorruptPackage(format!("write {}: {e}", ent.name)))?;
            }
        }
        let cursor = zout
            .finish()
            .map_err(|e| MergeError::CorruptPackage(format!("finish: {e}")))?;
        Ok(cursor.into_inner())
    }
}
