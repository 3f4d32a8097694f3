use crate::error::ApiError;

/// Maximum text length for speak requests, in characters
pub const MAX_TEXT_LENGTH: usize = 5000;

/// Validate an inbound speak request.
///
/// Blank text is accepted; the coordinator treats it as a no-op.
pub fn validate_speak_request(text: &str) -> Result<(), ApiError> {
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    if text.contains('\0') {
        return Err(ApiError::InvalidInput("Text contains NUL characters".to_string()));
    }
    Ok(())
}
