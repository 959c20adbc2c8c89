//! Post content rules.

use super::error::ValidationError;

pub const CONTENT_FIELD: &str = "content";

/// Check submitted content against the length bound.
///
/// Length is counted in Unicode scalar values. Only empty content is rejected;
/// whitespace is content and is stored exactly as submitted.
pub fn validate_content(content: &str, max_chars: usize) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::new(
            CONTENT_FIELD,
            "content must not be empty",
        ));
    }

    let length = content.chars().count();
    if length > max_chars {
        return Err(ValidationError::new(
            CONTENT_FIELD,
            format!("content is {length} characters; the limit is {max_chars}"),
        ));
    }

    Ok(())
}
