//! European number parsing for exported amounts
//!
//! Exports mix `1.234,56`, `1,234.56`, `1.740` (thousands) and `12.7`
//! (decimal). Ambiguous cases are resolved by digit counts around the
//! separator.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Parse a raw cell into an amount.
///
/// Returns None for missing, empty or unparseable input. Never fails.
pub fn parse_amount(raw: Option<&str>) -> Option<Decimal> {
    let raw = raw?;
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(period)) => {
            // Whichever separator comes last is the decimal point
            let (decimal, thousands) = if comma > period { (',', '.') } else { ('.', ',') };
            cleaned
                .replace(thousands, "")
                .replace(decimal, ".")
        }
        (Some(comma), None) => {
            let digits_after = cleaned[comma + 1..].len();
            if cleaned.matches(',').count() == 1 && digits_after <= 2 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, Some(_)) => {
            if period_is_decimal(&cleaned) {
                cleaned
            } else {
                cleaned.replace('.', "")
            }
        }
        (None, None) => cleaned,
    };

    to_decimal(&normalized)
}

/// A lone period is a decimal point only for short values like `12.7`
fn period_is_decimal(s: &str) -> bool {
    let mut parts = s.split('.');
    let (Some(before), Some(after), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let leading = before.trim_start_matches('-');
    if leading.len() > 2 || after.len() != 1 {
        return false;
    }
    if after == "0" {
        return false;
    }
    leading.parse::<u32>().map(|n| n <= 99).unwrap_or(true)
}

fn to_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim_end_matches('.');
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };
    if digits.is_empty() {
        return None;
    }
    let digits = if digits.starts_with('.') {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    Decimal::from_str(&format!("{}{}", sign, digits))
        .ok()
        .map(|d| d.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Option<Decimal> {
        Some(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_period_thousands_separator() {
        assert_eq!(parse_amount(Some("1.740")), dec("1740"));
        assert_eq!(parse_amount(Some("19.428")), dec("19428"));
        assert_eq!(parse_amount(Some("1.234.567")), dec("1234567"));
        // Trailing zero after the period reads as thousands
        assert_eq!(parse_amount(Some("12.0")), dec("120"));
    }

    #[test]
    fn test_period_short_decimal() {
        assert_eq!(parse_amount(Some("12.7")), dec("12.7"));
        assert_eq!(parse_amount(Some("-3.5")), dec("-3.5"));
        assert_eq!(parse_amount(Some("123.4")), dec("1234"));
    }

    #[test]
    fn test_comma_decimal() {
        assert_eq!(parse_amount(Some("1,5")), dec("1.5"));
        assert_eq!(parse_amount(Some("-1234,56")), dec("-1234.56"));
        assert_eq!(parse_amount(Some("1,234")), dec("1234"));
        assert_eq!(parse_amount(Some("1,234,567")), dec("1234567"));
    }

    #[test]
    fn test_both_separators_last_one_wins() {
        assert_eq!(parse_amount(Some("1.234,56")), dec("1234.56"));
        assert_eq!(parse_amount(Some("1,234.56")), dec("1234.56"));
        assert_eq!(parse_amount(Some("-12.345.678,9")), dec("-12345678.9"));
    }

    #[test]
    fn test_noise_is_stripped() {
        assert_eq!(parse_amount(Some(" kr 1.740 ")), dec("1740"));
        assert_eq!(parse_amount(Some("DKK -250")), dec("-250"));
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_amount(None), None);
        assert_eq!(parse_amount(Some("")), None);
        assert_eq!(parse_amount(Some("-")), None);
        assert_eq!(parse_amount(Some("n/a")), None);
        assert_eq!(parse_amount(Some("1-2")), None);
    }
}
