//! Phone number display normalization.

/// Belarusian country code.
const BY_PREFIX: &str = "375";
/// Digits in a full Belarusian number including the country code.
const BY_DIGITS: usize = 12;

/// Format a phone number for staff-facing notifications.
///
/// Belarusian numbers (`375` followed by 9 digits, any punctuation) become
/// `+375XXYYY-ZZ-WW`. Anything else is returned exactly as entered.
///
/// ```
/// use bakery_orders_core::format_phone;
///
/// assert_eq!(format_phone("+375 (44) 746-01-99"), "+37544746-01-99");
/// assert_eq!(format_phone("+7 900 000 00 00"), "+7 900 000 00 00");
/// ```
#[must_use]
pub fn format_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.len() != BY_DIGITS || !digits.starts_with(BY_PREFIX) {
        return raw.to_string();
    }

    // All characters are ASCII digits, so byte ranges are char boundaries.
    match (
        digits.get(0..5),
        digits.get(5..8),
        digits.get(8..10),
        digits.get(10..12),
    ) {
        (Some(head), Some(block), Some(pair_a), Some(pair_b)) => {
            format!("+{head}{block}-{pair_a}-{pair_b}")
        }
        _ => raw.to_string(),
    }
}
