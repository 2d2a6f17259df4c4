use super::{ExtractedQuantities, Quantity};
use regex::Regex;
use std::sync::LazyLock;

/// One to three leading digits, then any number of three-digit groups
/// optionally separated by a comma or a single space, then an optional
/// decimal part. A dot is always a decimal point: "1.234" is 1.234.
pub(super) const NUMBER: &str = r"\d{1,3}(?:[, ]?\d{3})*(?:\.\d+)?";

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b{NUMBER}\b")).expect("number pattern is valid"));

/// Strip group separators and parse. `None` for anything `f64` rejects,
/// which can happen for non-ASCII digits the pattern admits.
pub(super) fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != ' ').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Lazily walk every quantity in `text`, in source order.
pub fn iter_quantities(text: &str) -> impl Iterator<Item = Quantity> + '_ {
    NUMBER_RE.find_iter(text).filter_map(|m| {
        let value = parse_number(m.as_str())?;
        Some(Quantity {
            value,
            raw: m.as_str().to_string(),
            offset: m.start(),
        })
    })
}

/// Extract every syntactically plausible quantity from raw document text.
/// No semantic filtering: dates, ids and batch numbers all come through.
pub fn tokenize(text: &str) -> ExtractedQuantities {
    iter_quantities(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_and_decimals() {
        let set = tokenize("Total 1,234.56 MT");
        assert_eq!(set.values(), vec![1234.56]);
        assert_eq!(set.iter().next().unwrap().raw, "1,234.56");
    }

    #[test]
    fn test_space_grouping() {
        assert_eq!(tokenize("qty 12 345 kg").values(), vec![12345.0]);
    }

    #[test]
    fn test_newline_does_not_join_groups() {
        assert_eq!(tokenize("12\n345").values(), vec![12.0, 345.0]);
    }

    #[test]
    fn test_dot_is_decimal() {
        assert_eq!(tokenize("1.234").values(), vec![1.234]);
    }

    #[test]
    fn test_document_numbers_and_order() {
        let text = "Document Number: DR-2024-001\nDischarge Quantity: 1234.56 units\nBatch Number: BCH-789012";
        assert_eq!(tokenize(text).values(), vec![2024.0, 1.0, 1234.56, 789012.0]);
    }

    #[test]
    fn test_duplicates_preserved() {
        assert_eq!(tokenize("500 and 500").values(), vec![500.0, 500.0]);
    }

    #[test]
    fn test_idempotent() {
        let text = "Vessel 9 arrived 12/03/2024, discharged 4,500.250 tonnes of 5 000";
        assert_eq!(tokenize(text), tokenize(text));
    }

    #[test]
    fn test_offsets_point_at_raw() {
        let text = "ab 77 cd 1,000";
        for q in tokenize(text).iter() {
            assert_eq!(&text[q.offset..q.offset + q.raw.len()], q.raw);
        }
    }

    #[test]
    fn test_empty_and_numberless() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("no numbers here").is_empty());
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("١٢٣"), None);
    }
}
