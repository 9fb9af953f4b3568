/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('\u{feff}');
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn numeric_text(raw: &str) -> Option<String> {
    let cleaned: String = clean_str(raw).chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Finite float, thousands separators allowed. Blank or garbage is `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    numeric_text(raw)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Signed whole number. Accepts `"12.0"` style floats that carry no fraction.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let text = numeric_text(raw)?;
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    let v = text.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Non-negative count; negatives are treated as missing.
pub fn parse_count(raw: &str) -> Option<u64> {
    parse_integer(raw).and_then(|v| u64::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_quotes_and_bom() {
        assert_eq!(clean_str("  \"Queens\" "), "Queens");
        assert_eq!(clean_str("\u{feff}date_of_interest"), "date_of_interest");
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number("1,472,654"), Some(1_472_654.0));
        assert_eq!(parse_number("3.25"), Some(3.25));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn counts() {
        assert_eq!(parse_count("8804190"), Some(8_804_190));
        assert_eq!(parse_count("1200.0"), Some(1200));
        assert_eq!(parse_count("12.5"), None);
        assert_eq!(parse_count("-4"), None);
        assert_eq!(parse_integer("-4"), Some(-4));
    }
}
