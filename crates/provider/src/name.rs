//! Object name validation.
//!
//! Providers store objects in a flat namespace. Names come from user uploads,
//! so they are checked before they reach a filesystem path or a request body.

use crate::error::{ErrorKind, Result};

/// Validates an object name.
///
/// A valid name is a single non-empty component: no `/` or `\` separators, no
/// NUL bytes, and not one of the special `.` or `..` entries.
///
/// # Examples
///
/// ```
/// use colossus_provider::validate_object_name;
/// assert!(validate_object_name("holiday.mp4").is_ok());
/// assert!(validate_object_name("holiday.mp4.chunk3").is_ok());
/// assert!(validate_object_name("../holiday.mp4").is_err());
/// assert!(validate_object_name("").is_err());
/// ```
pub fn validate(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("report.pdf")]
    #[case("report.pdf.chunk0")]
    #[case(".hidden")]
    #[case("spaces are fine.txt")]
    #[case("ünïcödé.txt")]
    fn test_valid_names(#[case] name: &str) {
        assert_eq!(validate(name).unwrap(), name);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("a/b")]
    #[case("/etc/passwd")]
    #[case("a\\b")]
    #[case("a\0b")]
    fn test_invalid_names(#[case] name: &str) {
        let err = validate(name).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(_)));
    }
}
