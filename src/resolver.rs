// src/resolver.rs

use crate::quantity::{ExtractedQuantities, FieldMatch, Quantity};

/// Default absolute tolerance. Absorbs OCR/float rounding, not real
/// quantity discrepancies.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Where the matched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Field,
    Scan,
}

/// Outcome of the mechanical match.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub passed: bool,
    pub matched: Option<Quantity>,
    pub source: Option<MatchSource>,
}

impl Resolution {
    fn hit(quantity: &Quantity, source: MatchSource) -> Self {
        Self {
            passed: true,
            matched: Some(quantity.clone()),
            source: Some(source),
        }
    }

    fn miss() -> Self {
        Self {
            passed: false,
            matched: None,
            source: None,
        }
    }

    pub fn matched_value(&self) -> Option<f64> {
        self.matched.as_ref().map(|q| q.value)
    }
}

fn within(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

/// Decide whether `entered` appears in the document.
///
/// The located field is trusted first; failing that the first extracted
/// value in source order within `tolerance` wins. The comparison is a
/// strict `<`.
pub fn resolve(
    entered: f64,
    extracted: &ExtractedQuantities,
    field: Option<&FieldMatch>,
    tolerance: f64,
) -> Resolution {
    if let Some(field) = field {
        if within(field.value(), entered, tolerance) {
            return Resolution::hit(&field.quantity, MatchSource::Field);
        }
    }

    extracted
        .iter()
        .find(|q| within(q.value, entered, tolerance))
        .map(|q| Resolution::hit(q, MatchSource::Scan))
        .unwrap_or_else(Resolution::miss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::{locate_field, tokenize};

    #[test]
    fn test_tolerance_boundary() {
        let inside = tokenize("value 100.009");
        let r = resolve(100.0, &inside, None, DEFAULT_TOLERANCE);
        assert!(r.passed);
        assert_eq!(r.matched_value(), Some(100.009));

        let outside = tokenize("value 100.02");
        let r = resolve(100.0, &outside, None, DEFAULT_TOLERANCE);
        assert!(!r.passed);
        assert_eq!(r.matched_value(), None);
    }

    #[test]
    fn test_tolerance_is_strict() {
        let set = tokenize("5.5");
        assert!(!resolve(5.0, &set, None, 0.5).passed);
        assert!(resolve(5.0, &set, None, 0.51).passed);
    }

    #[test]
    fn test_field_takes_precedence() {
        let text = "Ref 700.004 ... WEIGHT OF CARGO DISCHARGED: 700";
        let set = tokenize(text);
        let field = locate_field(text);
        let r = resolve(700.0, &set, field.as_ref(), DEFAULT_TOLERANCE);
        assert_eq!(r.source, Some(MatchSource::Field));
        assert_eq!(r.matched_value(), Some(700.0));
    }

    #[test]
    fn test_scan_when_field_disagrees() {
        let text = "WEIGHT OF CARGO DISCHARGED: 700 / revised 650";
        let set = tokenize(text);
        let field = locate_field(text);
        let r = resolve(650.0, &set, field.as_ref(), DEFAULT_TOLERANCE);
        assert!(r.passed);
        assert_eq!(r.source, Some(MatchSource::Scan));
        assert_eq!(r.matched_value(), Some(650.0));
    }

    #[test]
    fn test_first_in_source_order() {
        let set = tokenize("12.004 then 12.001");
        let r = resolve(12.0, &set, None, DEFAULT_TOLERANCE);
        assert_eq!(r.matched_value(), Some(12.004));
    }

    #[test]
    fn test_zero_entered() {
        let set = tokenize("balance 0 remaining");
        assert!(resolve(0.0, &set, None, DEFAULT_TOLERANCE).passed);
    }

    #[test]
    fn test_matched_value_comes_from_sources() {
        let text = "Batch 789012, Discharge Quantity 1234.56";
        let set = tokenize(text);
        let r = resolve(1234.56, &set, None, DEFAULT_TOLERANCE);
        assert!(set.values().contains(&r.matched_value().unwrap()));
    }

    #[test]
    fn test_empty_set_misses() {
        let r = resolve(1.0, &ExtractedQuantities::default(), None, DEFAULT_TOLERANCE);
        assert_eq!(r, Resolution::miss());
    }
}
