use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::docx::document::TemplateDocument;
use crate::docx::xml::XmlEvent;
use crate::error::MergeError;

static CURLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("curly pattern"));
static SQUARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([\w][\w .\-]*)\]").expect("square pattern"));
static ANGLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<\s*([^<>]+?)\s*>>").expect("angle pattern"));

/// Recognized inline token conventions. A token text matched by more than
/// one convention still yields a single placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BracketStyle {
    DoubleCurly,
    Square,
    DoubleAngle,
}

impl BracketStyle {
    pub fn pattern(&self) -> &'static Regex {
        match self {
            BracketStyle::DoubleCurly => &CURLY_RE,
            BracketStyle::Square => &SQUARE_RE,
            BracketStyle::DoubleAngle => &ANGLE_RE,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "curly" => Some(BracketStyle::DoubleCurly),
            "square" => Some(BracketStyle::Square),
            "angle" => Some(BracketStyle::DoubleAngle),
            _ => None,
        }
    }
}

pub fn default_styles() -> Vec<BracketStyle> {
    vec![
        BracketStyle::DoubleCurly,
        BracketStyle::Square,
        BracketStyle::DoubleAngle,
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderKind {
    Bookmark,
    BracketedText,
}

#[derive(Clone, Debug)]
pub struct Placeholder {
    pub name: String,
    pub kind: PlaceholderKind,
    /// Documents the name was found in (batch scans union these).
    pub sources: BTreeSet<String>,
}

impl Placeholder {
    fn new(name: &str, kind: PlaceholderKind, source: &str) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source.to_string());
        Self {
            name: name.to_string(),
            kind,
            sources,
        }
    }
}

/// Scanner output for one document: bookmark anchors and inline bracket
/// tokens, each deduplicated by name in first-seen order.
#[derive(Debug)]
pub struct ScanReport {
    pub bookmarks: Vec<Placeholder>,
    pub placeholders: Vec<Placeholder>,
}

impl ScanReport {
    pub fn all(&self) -> impl Iterator<Item = &Placeholder> {
        self.bookmarks.iter().chain(self.placeholders.iter())
    }
}

/// Pure read of the document tree: bracket tokens are taken from text inside
/// `w:t` leaves only, so tokens split across runs are not recognized and
/// substitution later never has to cross a leaf boundary.
pub fn scan(doc: &TemplateDocument, styles: &[BracketStyle]) -> Result<ScanReport, MergeError> {
    let body = doc.body_events()?;

    let bookmarks: Vec<Placeholder> = doc
        .bookmark_names()
        .into_iter()
        .map(|n| Placeholder::new(&n, PlaceholderKind::Bookmark, &doc.name))
        .collect();

    let mut placeholders: Vec<Placeholder> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut wt_depth = 0usize;
    for ev in body {
        match ev {
            XmlEvent::Start { name, .. } if name == "w:t" => wt_depth += 1,
            XmlEvent::End { name } if name == "w:t" => wt_depth = wt_depth.saturating_sub(1),
            XmlEvent::Text { text } if wt_depth > 0 => {
                for style in styles {
                    for cap in style.pattern().captures_iter(text) {
                        let token = cap[1].trim();
                        if token.is_empty() || !seen.insert(token.to_string()) {
                            continue;
                        }
                        placeholders.push(Placeholder::new(
                            token,
                            PlaceholderKind::BracketedText,
                            &doc.name,
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    Ok(ScanReport {
        bookmarks,
        placeholders,
    })
}

/// Placeholder inventory merged across documents: one entry per distinct
/// name, first-seen kind and order, `sources` unioned.
#[derive(Default)]
pub struct PlaceholderSet {
    entries: Vec<Placeholder>,
}

impl PlaceholderSet {
    pub fn absorb(&mut self, report: ScanReport) {
        for ph in report
            .bookmarks
            .into_iter()
            .chain(report.placeholders.into_iter())
        {
            if let Some(existing) = self.entries.iter_mut().find(|e| e.name == ph.name) {
                existing.sources.extend(ph.sources);
            } else {
                self.entries.push(ph);
            }
        }
    }

    pub fn entries(&self) -> &[Placeholder] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ScanFailure {
    pub document: String,
    pub error: MergeError,
}

/// Batch scan with per-document recovery: one malformed template is reported
/// and skipped, the remaining documents still contribute to the set.
pub fn scan_all(
    docs: &[TemplateDocument],
    styles: &[BracketStyle],
) -> (PlaceholderSet, Vec<ScanFailure>) {
    let mut set = PlaceholderSet::default();
    let mut failures = Vec::new();
    for doc in docs {
        match scan(doc, styles) {
            Ok(report) => set.absorb(report),
            Err(error) => failures.push(ScanFailure {
                document: doc.name.clone(),
                error,
            }),
        }
    }
    (set, failures)
}
