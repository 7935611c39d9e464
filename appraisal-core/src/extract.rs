use crate::defs::{AppraisalError, FieldKey, ParsedAppraisal, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

/// A bold-delimited label: `**` followed by one or more non-asterisk
/// characters (newlines included) and a closing `**`.
static BOLD_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());

/// Whitespace as JavaScript's `trim` sees it, which includes the byte-order mark.
fn is_reply_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

fn trim_reply(text: &str) -> &str {
    text.trim_matches(is_reply_space)
}

/// One labeled block of a model reply, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSegment {
    /// Lowercased, trimmed label text.
    pub label: String,
    /// Trimmed content up to the next label or the end of the text.
    pub content: String,
}

/// Split a reply into labeled segments.
///
/// Text before the first label is ignored. The content of a segment runs from
/// the end of its label, past an optional `:` or `-` separator, to the start
/// of the next label. Segments whose content is empty are skipped.
pub fn segment(text: &str) -> Vec<LabeledSegment> {
    let labels: Vec<_> = BOLD_LABEL.captures_iter(text).collect();
    let mut segments = Vec::with_capacity(labels.len());

    for (i, caps) in labels.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = labels
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        let body = text[whole.end()..end].trim_start_matches(is_reply_space);
        let body = body
            .strip_prefix(':')
            .or_else(|| body.strip_prefix('-'))
            .unwrap_or(body);
        let content = trim_reply(body);

        if content.is_empty() {
            continue;
        }

        segments.push(LabeledSegment {
            label: trim_reply(label.as_str()).to_lowercase(),
            content: content.to_string(),
        });
    }

    segments
}

/// Map a lowercased label to a field key. First match wins, in this order.
pub fn classify_label(label: &str) -> Option<FieldKey> {
    let has = |needle: &str| label.contains(needle);

    if has("item name") || (has("name") && !has("market")) {
        Some(FieldKey::ItemName)
    } else if has("condition") {
        Some(FieldKey::Condition)
    } else if has("material") {
        Some(FieldKey::Materials)
    } else if has("dimension") {
        Some(FieldKey::Dimensions)
    } else if has("age") || has("period") {
        Some(FieldKey::Age)
    } else if has("maker") || has("origin") {
        Some(FieldKey::Maker)
    } else if has("detail") || has("description") {
        Some(FieldKey::Details)
    } else if has("damage") || has("flaw") {
        Some(FieldKey::Damage)
    } else if has("market") {
        Some(FieldKey::MarketNotes)
    } else if has("value") || has("price") || has("estimate") {
        Some(FieldKey::Price)
    } else {
        None
    }
}

/// Turn a model reply into structured appraisal fields.
///
/// Returns [`AppraisalError::NoContent`] for empty or blank input. When no
/// label classifies, the whole trimmed reply comes back as
/// [`ParsedAppraisal::Raw`]. A repeated field keeps its last value.
pub fn extract(text: &str) -> Result<ParsedAppraisal> {
    let trimmed = trim_reply(text);
    if trimmed.is_empty() {
        return Err(AppraisalError::NoContent);
    }

    let mut fields = BTreeMap::new();
    for LabeledSegment { label, content } in segment(trimmed) {
        match classify_label(&label) {
            Some(key) => {
                fields.insert(key, content);
            }
            None => debug!("Dropping unrecognized label: {:?}", label),
        }
    }

    if fields.is_empty() {
        return Ok(ParsedAppraisal::Raw {
            text: trimmed.to_string(),
        });
    }

    debug!("Extracted {} appraisal fields", fields.len());
    Ok(ParsedAppraisal::Structured { fields })
}
