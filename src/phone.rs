use crate::error::{invalid_argument, SessionResult};
use std::fmt;

const DIGITS: usize = 11;

/// A subscriber number normalised to the `7XXXXXXXXXX` form the gateway expects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalises user input: separators are stripped and a trunk prefix `8`
    /// is rewritten to the country code `7`.
    pub fn parse(raw: &str) -> SessionResult<Self> {
        let mut digits: String = raw
            .chars()
            .filter(|c| !matches!(c, '+' | '-' | ' ' | '(' | ')'))
            .collect();
        if digits.starts_with('8') {
            digits.replace_range(..1, "7");
        }
        if digits.len() != DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid_argument(format!(
                "phone number must contain exactly {DIGITS} digits"
            )));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Integer wire form used by the identity check.
    pub fn as_u64(&self) -> u64 {
        // Guaranteed to be 11 ASCII digits by `parse`.
        self.0.bytes().fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'))
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_phone(&self.0))
    }
}

/// Renders an 11-digit number as `+7 (900) 228-86-10`; anything else is returned as is.
pub fn format_phone(raw: &str) -> String {
    if raw.len() != DIGITS || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.to_owned();
    }
    format!(
        "+{} ({}) {}-{}-{}",
        &raw[..1],
        &raw[1..4],
        &raw[4..7],
        &raw[7..9],
        &raw[9..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trunk_prefix_rewritten() {
        let phone = PhoneNumber::parse("8 (900) 228-86-10").expect("valid");
        assert_eq!(phone.as_str(), "79002288610");
        assert_eq!(phone.as_u64(), 79_002_288_610);
    }

    #[test]
    fn rejects_short_and_alpha() {
        assert!(PhoneNumber::parse("+7900228861").is_err());
        assert!(PhoneNumber::parse("7900228861x").is_err());
        assert!(PhoneNumber::parse("").is_err());
    }

    #[test]
    fn formats_for_display() {
        assert_eq!(format_phone("79002288610"), "+7 (900) 228-86-10");
        assert_eq!(format_phone("12345"), "12345");
    }

    proptest! {
        #[test]
        fn parsed_numbers_are_eleven_digits_starting_with_seven(rest in "[0-9]{10}") {
            let raw = format!("+8{rest}");
            let phone = PhoneNumber::parse(&raw).expect("valid");
            prop_assert_eq!(phone.as_str().len(), 11);
            prop_assert!(phone.as_str().starts_with('7'));
            prop_assert_eq!(phone.as_u64().to_string(), phone.as_str());
        }
    }
}
