use std::collections::HashMap;

use crate::docx::xml::XmlEvent;
use crate::error::MergeError;
use crate::mapping::MappingStore;
use crate::scan::BracketStyle;

/// Render one data row against a deep copy of the template body fragment.
///
/// Every occurrence of every mapped placeholder is substituted: bracket
/// tokens inside `w:t` text, and the text enclosed by a mapped bookmark
/// range. Unmapped tokens are left verbatim; a mapped column missing from
/// the row substitutes the empty string. Only text leaves are ever written;
/// the caller's fragment is never touched.
pub fn render_row(
    body: &[XmlEvent],
    store: &MappingStore,
    styles: &[BracketStyle],
    values: &HashMap<String, String>,
) -> Result<Vec<XmlEvent>, MergeError> {
    let mut events = body.to_vec();
    substitute_bracket_tokens(&mut events, store, styles, values);
    substitute_bookmarks(&mut events, store, values)?;
    Ok(events)
}

fn lookup(
    store: &MappingStore,
    values: &HashMap<String, String>,
    placeholder: &str,
) -> Option<String> {
    store
        .get(placeholder)
        .map(|column| values.get(column).cloned().unwrap_or_default())
}

fn substitute_bracket_tokens(
    events: &mut [XmlEvent],
    store: &MappingStore,
    styles: &[BracketStyle],
    values: &HashMap<String, String>,
) {
    // (text index, enclosing w:t start index) pairs, collected first so the
    // events can be mutated afterwards.
    let mut leaves: Vec<(usize, usize)> = Vec::new();
    let mut wt_start: Option<usize> = None;
    for (idx, ev) in events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, .. } if name == "w:t" => wt_start = Some(idx),
            XmlEvent::End { name } if name == "w:t" => wt_start = None,
            XmlEvent::Text { .. } => {
                if let Some(start) = wt_start {
                    leaves.push((idx, start));
                }
            }
            _ => {}
        }
    }

    for (text_idx, elem_idx) in leaves {
        let current = match &events[text_idx] {
            XmlEvent::Text { text } => text.clone(),
            _ => continue,
        };
        let mut replaced = current.clone();
        for style in styles {
            replaced = style
                .pattern()
                .replace_all(&replaced, |caps: &regex::Captures| {
                    let token = caps[1].trim();
                    match lookup(store, values, token) {
                        Some(value) => value,
                        None => caps[0].to_string(),
                    }
                })
                .into_owned();
        }
        if replaced == current {
            continue;
        }
        let pad = replaced.starts_with(' ') || replaced.ends_with(' ');
        if let XmlEvent::Text { text } = &mut events[text_idx] {
            *text = replaced;
        }
        if pad {
            set_attr_value(&mut events[elem_idx], "xml:space", "preserve");
        }
    }
}

fn substitute_bookmarks(
    events: &mut [XmlEvent],
    store: &MappingStore,
    values: &HashMap<String, String>,
) -> Result<(), MergeError> {
    // Mapped bookmark ranges: (value, start marker index, end marker index).
    let mut ranges: Vec<(String, usize, usize)> = Vec::new();
    for (idx, ev) in events.iter().enumerate() {
        let attrs = match ev {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }
                if name == "w:bookmarkStart" =>
            {
                attrs
            }
            _ => continue,
        };
        let name = match attrs.iter().find(|(k, _)| k == "w:name") {
            Some((_, v)) => v.clone(),
            None => continue,
        };
        let value = match lookup(store, values, &name) {
            Some(v) => v,
            None => continue,
        };
        let id = attrs
            .iter()
            .find(|(k, _)| k == "w:id")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let end = find_bookmark_end(events, idx + 1, &id).ok_or_else(|| {
            MergeError::MalformedDocument(format!("bookmark {name:?} has no matching end marker"))
        })?;
        ranges.push((value, idx, end));
    }

    for (value, start, end) in ranges {
        let mut leaves: Vec<(usize, usize)> = Vec::new();
        let mut wt_start: Option<usize> = None;
        for idx in start + 1..end {
            match &events[idx] {
                XmlEvent::Start { name, .. } if name == "w:t" => wt_start = Some(idx),
                XmlEvent::End { name } if name == "w:t" => wt_start = None,
                XmlEvent::Text { .. } => {
                    if let Some(s) = wt_start {
                        leaves.push((idx, s));
                    }
                }
                _ => {}
            }
        }
        // A collapsed range encloses no text leaf; inventing a run would
        // break the leaves-only rule, so it is left untouched.
        for (i, (text_idx, elem_idx)) in leaves.iter().enumerate() {
            let new_text = if i == 0 { value.clone() } else { String::new() };
            let pad = new_text.starts_with(' ') || new_text.ends_with(' ');
            if let XmlEvent::Text { text } = &mut events[*text_idx] {
                *text = new_text;
            }
            if pad {
                set_attr_value(&mut events[*elem_idx], "xml:space", "preserve");
            }
        }
    }
    Ok(())
}

fn find_bookmark_end(events: &[XmlEvent], from: usize, id: &str) -> Option<usize> {
    events.iter().enumerate().skip(from).find_map(|(idx, ev)| {
        let attrs = match ev {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }
                if name == "w:bookmarkEnd" =>
            {
                attrs
            }
            _ => return None,
        };
        let matches = attrs.iter().any(|(k, v)| k == "w:id" && v == id);
        matches.then_some(idx)
    })
}

fn set_attr_value(ev: &mut XmlEvent, key: &str, value: &str) {
    match ev {
        XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => {
            for (k, v) in attrs.iter_mut() {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
            attrs.push((key.to_string(), value.to_string()));
        }
        _ => {}
    }
}
