//! Cell-level value parsing shared by the file normalizers

/// Parse the boolean spellings found across export versions
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a non-negative counter, tolerating thousands separators and
/// float-formatted integers ("1,204", "12.0")
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | ' ')).collect();
    let value: f64 = cleaned.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value.round() as u64)
    } else {
        None
    }
}

/// Parse a money amount with currency symbols.
///
/// Also strips the mis-decoded euro sign ("â‚¬") that appears when a UTF-8
/// export was re-saved as Windows-1252.
pub fn parse_money(raw: &str) -> Option<f64> {
    let cleaned = raw.replace("â‚¬", "");
    let cleaned: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();
    cleaned.parse().ok()
}

/// Normalize an email for joining
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        None
    } else {
        Some(email)
    }
}

/// Normalize a country cell: two-letter codes are upper-cased, names are
/// whitespace-collapsed
pub fn normalize_country(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.len() == 2 && collapsed.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(collapsed.to_ascii_uppercase())
    } else {
        Some(collapsed)
    }
}

/// Leading numeric part of a composite post id ("179800700.title-slug")
pub fn parse_post_id(raw: &str) -> Option<u64> {
    raw.trim().split('.').next()?.trim().parse().ok()
}
