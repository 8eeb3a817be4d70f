use crate::error::{Result, SampleError};
use crate::models::SampleOrigin;

/// Validation utilities for sample inputs
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate an origin used to write rows
    ///
    /// `any` is a read filter and is rejected here.
    pub fn validate_storage_origin(origin: SampleOrigin) -> Result<()> {
        if !origin.is_storable() {
            return Err(SampleError::InvalidOrigin(origin));
        }
        Ok(())
    }

    /// Validate a message passed to a single-item call
    pub fn validate_message(message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(SampleError::EmptyMessage);
        }
        Ok(())
    }

    /// Normalize an import line, returning `None` for blank lines
    #[must_use]
    pub fn normalize_line(line: &str) -> Option<&str> {
        let trimmed = line.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Check a raw line read through a `max`-byte window
    ///
    /// A line is too long when the window filled up before a terminator
    /// was seen.
    pub fn validate_line_length(raw: &[u8], max: usize, line: usize) -> Result<()> {
        if raw.len() >= max && !raw.ends_with(b"\n") {
            return Err(SampleError::LineTooLong { line, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_origin() {
        assert!(InputValidator::validate_storage_origin(SampleOrigin::Preset).is_ok());
        assert!(InputValidator::validate_storage_origin(SampleOrigin::User).is_ok());
        let err = InputValidator::validate_storage_origin(SampleOrigin::Any).unwrap_err();
        assert!(matches!(err, SampleError::InvalidOrigin(SampleOrigin::Any)));
    }

    #[test]
    fn test_message() {
        assert!(InputValidator::validate_message("hello").is_ok());
        assert!(InputValidator::validate_message("test 👍 message 🚀").is_ok());
        assert!(matches!(
            InputValidator::validate_message(""),
            Err(SampleError::EmptyMessage)
        ));
        assert!(InputValidator::validate_message(" \t\n").is_err());
    }

    #[test]
    fn test_normalize_line() {
        assert_eq!(InputValidator::normalize_line("  spam offer \r\n"), Some("spam offer"));
        assert_eq!(InputValidator::normalize_line("\n"), None);
        assert_eq!(InputValidator::normalize_line(""), None);
    }

    #[test]
    fn test_line_length_boundary() {
        let max = 16;
        let mut fits = vec![b'a'; max - 1];
        fits.push(b'\n');
        assert!(InputValidator::validate_line_length(&fits, max, 1).is_ok());

        // last line without terminator, shorter than the window
        assert!(InputValidator::validate_line_length(&[b'a'; 15], max, 1).is_ok());

        let err = InputValidator::validate_line_length(&[b'a'; 16], max, 4).unwrap_err();
        assert!(matches!(err, SampleError::LineTooLong { line: 4, max: 16 }));
    }
}
