use chrono::NaiveDate;

/// `M/D/YY` or `MM/DD/YYYY`, as used by the JHU headers and NYC Health rows.
pub fn parse_us_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.trim().split('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year_str = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let year: i32 = match year_str.len() {
        2 => 2000 + year_str.parse::<i32>().ok()?,
        4 => year_str.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `YYYY-MM-DD`
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Either of the two layouts above.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_us_date(s).or_else(|| parse_iso_date(s))
}
