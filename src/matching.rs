use strsim::normalized_levenshtein;

use crate::mapping::MappingStore;

/// A match below this confidence is discarded (`column = None`).
pub const ACCEPT_THRESHOLD: f64 = 0.5;
/// An accepted match below this confidence is flagged for review. Advisory
/// only; it never blocks the mapping.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchDecision {
    pub column: Option<usize>,
    pub confidence: f64,
}

impl MatchDecision {
    fn none() -> Self {
        Self {
            column: None,
            confidence: 0.0,
        }
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn words(s: &str) -> Vec<String> {
    s.split(['_', '-', '.', ' '])
        .filter(|w| w.chars().count() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

fn acronym(s: &str) -> String {
    s.chars().filter(|c| c.is_uppercase()).collect()
}

fn exact_score(np: &str, nh: &str) -> Option<f64> {
    (!np.is_empty() && np == nh).then_some(1.0)
}

fn containment_score(np: &str, nh: &str) -> Option<f64> {
    let (lp, lh) = (np.chars().count(), nh.chars().count());
    if !np.is_empty() && nh.contains(np) && lh > lp {
        let diff = (lh - lp) as f64;
        return Some((0.9 - 0.05 * diff).max(0.8));
    }
    if lh > 2 && np.contains(nh) && lp > lh {
        let diff = (lp - lh) as f64;
        return Some((0.85 - 0.03 * diff).max(0.75));
    }
    None
}

fn word_overlap_score(placeholder: &str, header: &str) -> Option<f64> {
    let wp = words(placeholder);
    let wh = words(header);
    if wp.is_empty() || wh.is_empty() {
        return None;
    }
    let mut sum = 0.0;
    for a in &wp {
        let mut best = 0.0f64;
        for b in &wh {
            let weight = if a == b {
                1.0
            } else if a.contains(b.as_str()) || b.contains(a.as_str()) {
                0.7
            } else if normalized_levenshtein(a, b) > 0.8 {
                0.6
            } else {
                0.0
            };
            best = best.max(weight);
        }
        sum += best;
    }
    let confidence = sum / wp.len().max(wh.len()) as f64 * 0.8;
    (confidence > 0.4).then_some(confidence)
}

fn levenshtein_score(np: &str, nh: &str) -> Option<f64> {
    if np.is_empty() || nh.is_empty() {
        return None;
    }
    let sim = normalized_levenshtein(np, nh);
    (sim > 0.5).then_some(sim * 0.7)
}

fn acronym_score(placeholder: &str, header: &str) -> Option<f64> {
    let ap = acronym(placeholder);
    let ah = acronym(header);
    (ap.chars().count() >= 2 && ap == ah).then_some(0.75)
}

/// Best column for one placeholder name, or none. Strategies run in a fixed
/// cascade (exact, containment, word overlap, edit distance, acronym); the
/// highest confidence wins, a later candidate must be strictly better to
/// displace an earlier one, so exact ties resolve to the earlier strategy
/// and, within one strategy, to the lower column index. Pure and
/// deterministic for identical inputs.
pub fn find_best_match(placeholder: &str, headers: &[String]) -> MatchDecision {
    let np = normalize(placeholder);
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();

    type Strategy<'a> = Box<dyn Fn(usize) -> Option<f64> + 'a>;
    let strategies: Vec<Strategy<'_>> = vec![
        Box::new(|i: usize| exact_score(&np, &normalized[i])),
        Box::new(|i: usize| containment_score(&np, &normalized[i])),
        Box::new(|i: usize| word_overlap_score(placeholder, &headers[i])),
        Box::new(|i: usize| levenshtein_score(&np, &normalized[i])),
        Box::new(|i: usize| acronym_score(placeholder, &headers[i])),
    ];

    let mut best = MatchDecision::none();
    for strategy in &strategies {
        for i in 0..headers.len() {
            if let Some(confidence) = strategy(i) {
                if confidence > best.confidence {
                    best = MatchDecision {
                        column: Some(i),
                        confidence,
                    };
                }
            }
        }
    }

    if best.confidence >= ACCEPT_THRESHOLD {
        best
    } else {
        MatchDecision::none()
    }
}

#[derive(Clone, Debug)]
pub struct AppliedMapping {
    pub placeholder: String,
    pub column: String,
    pub confidence: f64,
    pub low_confidence: bool,
}

#[derive(Default)]
pub struct AutoMapReport {
    pub applied: Vec<AppliedMapping>,
    pub unmatched: Vec<String>,
}

impl AutoMapReport {
    pub fn mapped_count(&self) -> usize {
        self.applied.len()
    }

    pub fn needs_review(&self) -> impl Iterator<Item = &AppliedMapping> {
        self.applied.iter().filter(|m| m.low_confidence)
    }
}

/// Match every placeholder (in scan order) against all columns and apply the
/// winners to the store. Low-confidence winners are still applied, only
/// flagged.
pub fn auto_map(
    placeholders: &[String],
    headers: &[String],
    store: &mut MappingStore,
) -> AutoMapReport {
    let mut report = AutoMapReport::default();
    for name in placeholders {
        let decision = find_best_match(name, headers);
        match decision.column {
            Some(i) => {
                store.set(name, &headers[i]);
                report.applied.push(AppliedMapping {
                    placeholder: name.clone(),
                    column: headers[i].clone(),
                    confidence: decision.confidence,
                    low_confidence: decision.confidence < LOW_CONFIDENCE_THRESHOLD,
                });
            }
            None => report.unmatched.push(name.clone()),
        }
    }
    report
}
