//! Decides whether a sheet-service failure means "the sheet is full".

use crate::sheet_service::{ServiceErrorKind, SheetServiceError};

/// Service error codes that signal a full sheet.
pub const CAPACITY_ERROR_CODES: &[u32] = &[1036];

/// Lowercase message fragments that signal a full sheet.
pub const CAPACITY_MESSAGE_PATTERNS: &[&str] = &[
    "maximum number of rows",
    "row limit",
    "too many rows",
    "maximum number of cells",
    "cell reference limit",
    "maximum number of cell references",
    "formula reference limit",
    "too many cell references",
];

/// Returns true when the error is a capacity problem.
///
/// A structured kind set by the client always wins. Code and message
/// matching only apply to errors the client left unclassified.
pub fn is_capacity_error(error: &SheetServiceError) -> bool {
    match error.kind {
        ServiceErrorKind::RowLimit | ServiceErrorKind::ReferenceLimit => true,
        ServiceErrorKind::Unknown => is_capacity_signal(error.code, &error.message),
        _ => false,
    }
}

/// Raw code/message check.
pub fn is_capacity_signal(code: Option<u32>, message: &str) -> bool {
    if code.is_some_and(|c| CAPACITY_ERROR_CODES.contains(&c)) {
        return true;
    }
    let message = message.to_lowercase();
    CAPACITY_MESSAGE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_is_capacity() {
        let err = SheetServiceError::unclassified(Some(1036), "");
        assert!(is_capacity_error(&err));
    }

    #[test]
    fn test_other_code_is_not_capacity() {
        let err = SheetServiceError::unclassified(Some(200), "");
        assert!(!is_capacity_error(&err));
    }

    #[test]
    fn test_row_limit_message_is_capacity() {
        let err = SheetServiceError::unclassified(None, "maximum number of rows exceeded");
        assert!(is_capacity_error(&err));
    }

    #[test]
    fn test_message_match_is_case_insensitive() {
        assert!(is_capacity_signal(None, "Maximum Number Of Rows exceeded"));
        assert!(is_capacity_signal(None, "Cell Reference Limit reached for this sheet"));
    }

    #[test]
    fn test_unrelated_message_is_not_capacity() {
        let err = SheetServiceError::unclassified(None, "invalid token");
        assert!(!is_capacity_error(&err));
    }

    #[test]
    fn test_structured_kinds() {
        let full = SheetServiceError::new(ServiceErrorKind::RowLimit, "");
        let refs = SheetServiceError::new(ServiceErrorKind::ReferenceLimit, "");
        assert!(is_capacity_error(&full));
        assert!(is_capacity_error(&refs));
    }

    #[test]
    fn test_structured_kind_overrides_message() {
        // A classified auth failure is never treated as capacity, whatever it says.
        let err = SheetServiceError::new(ServiceErrorKind::Unauthorized, "row limit")
            .with_code(1036);
        assert!(!is_capacity_error(&err));
    }
}
