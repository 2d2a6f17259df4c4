use super::FieldMatch;
use super::tokenizer::{NUMBER, iter_quantities};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Label patterns, most specific first. The bare "DISCHARGED" fallback is
/// prone to false positives so it only runs after every qualified label.
const LABELS: &[(&str, &str)] = &[
    (
        "WEIGHT OF CARGO DISCHARGED",
        r"W(?:EIGHT|T)\.?\s*(?:OF\s*)?CARGO\s*DISCHARGED",
    ),
    (
        "CARGO DISCHARGED QUANTITY",
        r"CARGO\s*DISCHARGED\s*(?:WEIGHT|WT|QTY|QUANTITY|VALUE|VOL(?:UME)?)\.?",
    ),
    (
        "DISCHARGED QUANTITY",
        r"DISCHARGED\s*(?:WEIGHT|WT|QTY|QUANTITY|VALUE|CARGO)\.?",
    ),
    (
        "QUANTITY OF CARGO DISCHARGED",
        r"(?:WEIGHT|WT|QTY|QUANTITY|VALUE)\s*(?:OF\s*)?(?:CARGO\s*)?DISCHARGED",
    ),
    ("QUANTITY DISCHARGED", r"(?:QUANTITY|QTY)\s*DISCHARGED"),
    ("TOTAL DISCHARGED", r"(?:TOTAL|NET|GROSS)\s*(?:CARGO\s*)?DISCHARGED"),
    ("DISCHARGED", r"DISCHARGED"),
    (
        "DELIVERED QUANTITY",
        r"DELIVERED\s*(?:WEIGHT|WT|QTY|QUANTITY|VALUE)\.?",
    ),
];

/// Optional separator between a label and its value. Unicode dashes
/// (hyphen through horizontal bar, minus sign) count as '-'.
const SEPARATOR: &str = r"\s*[:=\-\x{2010}-\x{2015}\x{2212}]?\s*";

static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    LABELS
        .iter()
        .map(|(name, label)| {
            let re = Regex::new(&format!(r"(?i){label}{SEPARATOR}\b({NUMBER})\b"))
                .expect("field pattern is valid");
            (*name, re)
        })
        .collect()
});

/// Find the discharged-quantity field. The first label pattern (in
/// priority order) that matches anywhere in the text wins.
///
/// The value must be a whole token as `tokenize` sees it, so the field can
/// never report a number the tokenizer did not extract. Labels may span
/// line breaks, values may not.
pub fn locate_field(text: &str) -> Option<FieldMatch> {
    for (label, re) in PATTERNS.iter() {
        let label: &'static str = *label;
        for cap in re.captures_iter(text) {
            let Some(m) = cap.get(1) else {
                continue;
            };
            let Some(quantity) =
                iter_quantities(text).find(|q| q.offset == m.start() && q.raw == m.as_str())
            else {
                continue;
            };
            debug!(label = %label, value = quantity.value, "Located discharged quantity field");
            return Some(FieldMatch { quantity, label });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_of_cargo_discharged() {
        let m = locate_field("WEIGHT OF CARGO DISCHARGED: 1,234.56 MT").unwrap();
        assert_eq!(m.value(), 1234.56);
        assert_eq!(m.label, "WEIGHT OF CARGO DISCHARGED");
    }

    #[test]
    fn test_priority_beats_position() {
        let text = "TOTAL DISCHARGED: 500\nWEIGHT OF CARGO DISCHARGED: 700";
        let m = locate_field(text).unwrap();
        assert_eq!(m.value(), 700.0);
    }

    #[test]
    fn test_case_insensitive_and_ocr_spacing() {
        let m = locate_field("wt. of cargo\n\n   discharged = 42.5").unwrap();
        assert_eq!(m.value(), 42.5);
        let m = locate_field("WEIGHTOFCARGO DISCHARGED 88").unwrap();
        assert_eq!(m.value(), 88.0);
    }

    #[test]
    fn test_unicode_dash_separator() {
        let m = locate_field("Quantity Discharged \u{2014} 3 150").unwrap();
        assert_eq!(m.value(), 3150.0);
        assert_eq!(m.label, "QUANTITY OF CARGO DISCHARGED");
    }

    #[test]
    fn test_cargo_discharged_qty() {
        let m = locate_field("Cargo Discharged Qty: 910").unwrap();
        assert_eq!(m.label, "CARGO DISCHARGED QUANTITY");
        assert_eq!(m.value(), 910.0);
    }

    #[test]
    fn test_net_discharged() {
        let m = locate_field("Net Discharged: 12,000").unwrap();
        assert_eq!(m.label, "TOTAL DISCHARGED");
        assert_eq!(m.value(), 12000.0);
    }

    #[test]
    fn test_bare_discharged_fallback() {
        let m = locate_field("Port: Rotterdam. Discharged 300 on arrival").unwrap();
        assert_eq!(m.label, "DISCHARGED");
        assert_eq!(m.value(), 300.0);
    }

    #[test]
    fn test_delivered_quantity() {
        let m = locate_field("Delivered Qty: 75.5").unwrap();
        assert_eq!(m.label, "DELIVERED QUANTITY");
        assert_eq!(m.value(), 75.5);
    }

    #[test]
    fn test_label_without_number() {
        assert!(locate_field("Discharge Quantity: 1234.56 units").is_none());
        assert!(locate_field("WEIGHT OF CARGO DISCHARGED: see annex").is_none());
    }

    #[test]
    fn test_value_does_not_span_lines() {
        let text = "WEIGHT OF CARGO DISCHARGED: 12\n345 MT";
        let m = locate_field(text).unwrap();
        assert_eq!(m.value(), 12.0);
        assert_eq!(m.quantity.raw, "12");
    }

    #[test]
    fn test_digits_glued_to_label_rejected() {
        assert!(locate_field("Cargo DISCHARGED2024 ref").is_none());
    }

    #[test]
    fn test_value_is_an_extracted_token() {
        let text = "Ref 9\nNet Discharged:\n  4 500,250 MT\nwt of cargo discharged- 77";
        let tokens = crate::quantity::tokenize(text);
        let m = locate_field(text).unwrap();
        assert_eq!(m.label, "WEIGHT OF CARGO DISCHARGED");
        assert!(tokens.iter().any(|q| *q == m.quantity));
    }
}
