use crate::error::ApiError;

/// Maximum text length for speak requests
const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum voice id length
const MAX_VOICE_ID_LENGTH: usize = 128;

/// Validate a speak request.
///
/// Empty text is accepted here; playing nothing is a no-op, not an error.
pub fn validate_speak_request(text: &str, voice_id: &str) -> Result<(), ApiError> {
    if text.len() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    validate_voice_id(voice_id)
}

/// Validate voice id format (e.g., henry, en-US-lisa, voice_01)
pub fn validate_voice_id(voice_id: &str) -> Result<(), ApiError> {
    if voice_id.is_empty() {
        return Err(ApiError::InvalidInput("Voice id cannot be empty".to_string()));
    }
    if voice_id.len() > MAX_VOICE_ID_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Voice id too long (max {} characters)",
            MAX_VOICE_ID_LENGTH
        )));
    }
    if !voice_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(ApiError::InvalidInput(format!(
            "Invalid voice id: {}",
            voice_id
        )));
    }
    Ok(())
}
