use crate::defs::{AppraisalError, FieldKey, ParsedAppraisal};
use crate::extract::extract;

/// Marker the model is asked to write for attributes it cannot see.
pub const NOT_AVAILABLE: &str = "N/A";

/// Display text for a reply with no content.
pub const NO_RESPONSE: &str = "No response.";

impl FieldKey {
    /// Heading shown next to the value on an appraisal card.
    pub fn display_label(&self) -> &'static str {
        match self {
            FieldKey::ItemName => "Item name",
            FieldKey::Condition => "Condition",
            FieldKey::Materials => "Materials",
            FieldKey::Dimensions => "Dimensions",
            FieldKey::Age => "Age / Period",
            FieldKey::Maker => "Maker / Origin",
            FieldKey::Details => "Details",
            FieldKey::Damage => "Damage / Flaws",
            FieldKey::MarketNotes => "Market notes",
            FieldKey::Price => "Price",
        }
    }
}

/// `Some(value)` unless the value is empty or exactly "N/A".
pub fn displayable(value: &str) -> Option<&str> {
    if value.is_empty() || value == NOT_AVAILABLE {
        None
    } else {
        Some(value)
    }
}

/// Render a parsed appraisal as a plain-text card.
///
/// The item name is the title, the detail rows follow in display order with
/// hidden values filtered out, and the price comes last.
pub fn render_appraisal(parsed: &ParsedAppraisal) -> String {
    let fields = match parsed {
        ParsedAppraisal::Raw { text } => return text.clone(),
        ParsedAppraisal::Structured { fields } => fields,
    };

    let mut out = String::new();
    let visible = |key: FieldKey| fields.get(&key).and_then(|v| displayable(v));

    if let Some(name) = visible(FieldKey::ItemName) {
        out.push_str(&format!("== {} ==\n", name));
    }

    for key in FieldKey::ALL {
        if matches!(key, FieldKey::ItemName | FieldKey::Price) {
            continue;
        }
        if let Some(value) = visible(key) {
            out.push_str(&format!("{}: {}\n", key.display_label(), value));
        }
    }

    if let Some(price) = visible(FieldKey::Price) {
        out.push_str(&format!("{}: {}\n", FieldKey::Price.display_label(), price));
    }

    out.trim_end().to_string()
}

/// Extract and render a reply in one step, mapping blank input to "No response.".
pub fn render_card(text: &str) -> String {
    match extract(text) {
        Ok(parsed) => render_appraisal(&parsed),
        Err(AppraisalError::NoContent) => NO_RESPONSE.to_string(),
        Err(e) => e.to_string(),
    }
}
