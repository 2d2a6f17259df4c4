// src/quantity/mod.rs

mod field;
mod tokenizer;

use serde::Serialize;

pub use field::locate_field;
pub use tokenizer::tokenize;

/// A numeric value found in document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantity {
    pub value: f64,
    /// The text as it appeared in the document, e.g. "1,234.56".
    pub raw: String,
    /// Byte offset of `raw` in the text it was found in.
    pub offset: usize,
}

/// Every quantity found in a document, in the order they appear.
/// Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractedQuantities(Vec<Quantity>);

impl ExtractedQuantities {
    pub fn iter(&self) -> std::slice::Iter<'_, Quantity> {
        self.0.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|q| q.value).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Quantity> for ExtractedQuantities {
    fn from_iter<I: IntoIterator<Item = Quantity>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ExtractedQuantities {
    type Item = &'a Quantity;
    type IntoIter = std::slice::Iter<'a, Quantity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The discharged-quantity field located by label, tagged with the label
/// pattern that found it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMatch {
    pub quantity: Quantity,
    pub label: &'static str,
}

impl FieldMatch {
    pub fn value(&self) -> f64 {
        self.quantity.value
    }
}

/// Render values the way remarks and prompts show them: `[2024, 1, 1234.56]`.
pub fn format_values(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_values() {
        assert_eq!(format_values(&[2024.0, 1.0, 1234.56]), "[2024, 1, 1234.56]");
        assert_eq!(format_values(&[]), "[]");
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let set = tokenize("Net 1,500 then 20");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json[0]["value"], 1500.0);
        assert_eq!(json[0]["raw"], "1,500");
        assert_eq!(json[1]["value"], 20.0);
    }
}
