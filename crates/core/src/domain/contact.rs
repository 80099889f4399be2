/// Reduce a phone number to bare digits, dropping a leading US country code.
///
/// `(615) 555-0101`, `615-555-0101`, and `+1 615 555 0101` all normalize to
/// `6155550101`, which is the form used for owner-number matching and client
/// lookup.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|ch| ch.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

/// Format a number for display as `(xxx) xxx-xxxx`; anything that does not
/// normalize to 10 digits is returned untouched.
pub fn format_phone(raw: &str) -> String {
    let digits = normalize_phone(raw);
    if digits.len() == 10 {
        format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
    } else {
        raw.to_string()
    }
}
