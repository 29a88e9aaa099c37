//! Pure input helpers shared by the login, signup, create and edit flows.
//!
//! None of these perform I/O and all of them are total: empty input is simply
//! "invalid" (or an empty mask), never an error.

use chrono::NaiveDate;

/// Number of digits in a CPF.
pub const CPF_LEN: usize = 11;

/// Symbols accepted (and one of which is required) in a strong password.
pub const PASSWORD_SYMBOLS: &[char] = &['@', '$', '!', '%', '*', '?', '&'];

pub const MIN_PASSWORD_LEN: usize = 8;

/// Extracts the digits of a CPF, truncated to 11. This is the stored and
/// transmitted form.
pub fn cpf_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).take(CPF_LEN).collect()
}

/// mask_cpf
///
/// Formats digit-only or mixed input as `ddd.ddd.ddd-dd`. Partial input yields a
/// partial mask (`"1234"` becomes `"123.4"`); separators only appear once a digit
/// follows them.
pub fn mask_cpf(raw: &str) -> String {
    let digits = cpf_digits(raw);
    let mut masked = String::with_capacity(14);

    for (i, c) in digits.chars().enumerate() {
        match i {
            3 | 6 => masked.push('.'),
            9 => masked.push('-'),
            _ => {}
        }
        masked.push(c);
    }
    masked
}

/// is_valid_date
///
/// Accepts only `YYYY-MM-DD` and only when it names a real calendar day, so
/// `2024-02-30` is rejected instead of rolling into March.
pub fn is_valid_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let all_digits = bytes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 4 && *i != 7)
        .all(|(_, b)| b.is_ascii_digit());
    if !all_digits {
        return false;
    }

    // Slices are ASCII digits at this point, so the parses cannot fail.
    let (Ok(year), Ok(month), Ok(day)) = (
        s[0..4].parse::<i32>(),
        s[5..7].parse::<u32>(),
        s[8..10].parse::<u32>(),
    ) else {
        return false;
    };
    NaiveDate::from_ymd_opt(year, month, day).is_some()
}

/// is_strong_password
///
/// At least 8 characters drawn from letters, digits and `@$!%*?&`, with at least
/// one digit, one lowercase letter, one uppercase letter and one of those symbols.
pub fn is_strong_password(s: &str) -> bool {
    let allowed = |c: char| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(&c);

    s.chars().count() >= MIN_PASSWORD_LEN
        && s.chars().all(allowed)
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().any(|c| c.is_ascii_lowercase())
        && s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| PASSWORD_SYMBOLS.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_full_and_partial_cpf() {
        assert_eq!(mask_cpf("12345678901"), "123.456.789-01");
        assert_eq!(mask_cpf("123.456.789-01"), "123.456.789-01");
        assert_eq!(mask_cpf("1234"), "123.4");
        assert_eq!(mask_cpf("1234567"), "123.456.7");
        assert_eq!(mask_cpf("123456789"), "123.456.789");
        assert_eq!(mask_cpf("1234567890"), "123.456.789-0");
        assert_eq!(mask_cpf(""), "");
        assert_eq!(mask_cpf("abc"), "");
    }

    #[test]
    fn mask_preserves_digit_sequence() {
        let inputs = [
            "",
            "1",
            "12a3",
            "123.456.789-01",
            "98765432109876",
            " 0 0 0 1 ",
            "111.222",
        ];
        for input in inputs {
            assert_eq!(cpf_digits(&mask_cpf(input)), cpf_digits(input), "input {input:?}");
        }
    }

    #[test]
    fn mask_is_idempotent() {
        for input in ["12345678901", "1234", "12.3-4"] {
            let once = mask_cpf(input);
            assert_eq!(mask_cpf(&once), once);
        }
    }

    #[test]
    fn cpf_digits_truncates_to_eleven() {
        assert_eq!(cpf_digits("123456789012345"), "12345678901");
    }

    #[test]
    fn date_validation() {
        assert!(!is_valid_date("2024-02-30"));
        assert!(is_valid_date("2024-02-29"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(!is_valid_date("2024-2-9"));
        assert!(!is_valid_date("2024-13-01"));
        assert!(!is_valid_date("2024-00-10"));
        assert!(!is_valid_date("24-02-2024"));
        assert!(!is_valid_date("2024/02/10"));
        assert!(!is_valid_date("2024-02-1a"));
        assert!(!is_valid_date(""));
        assert!(is_valid_date("1990-12-31"));
    }

    #[test]
    fn password_strength() {
        assert!(!is_strong_password("abc12345"));
        assert!(is_strong_password("Abc123!@"));
        assert!(is_strong_password("Str0ng!Pass"));
        assert!(!is_strong_password("Ab1!"));
        assert!(!is_strong_password("ABC123!@"));
        assert!(!is_strong_password("Abcdefg!"));
        assert!(!is_strong_password("Abc12345"));
        // Characters outside the allowed alphabet are refused.
        assert!(!is_strong_password("Abc123!@ "));
        assert!(!is_strong_password("Abc123#!"));
        assert!(!is_strong_password(""));
    }
}
