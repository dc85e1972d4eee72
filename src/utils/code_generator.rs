//! Random token generation.

use crate::error::AppError;
use base64::Engine as _;
use serde_json::json;

/// Random bytes per issued token. Encodes to 11 characters.
pub const TOKEN_BYTES: usize = 8;

/// Generates a URL-safe token from `size` bytes of OS entropy.
///
/// Encoded as URL-safe base64 without padding, so every output character is
/// one of `A-Z a-z 0-9 - _`.
///
/// # Errors
///
/// Returns [`AppError::Internal`] if the system random source fails. The
/// caller's attempt fails; nothing is retried here.
///
/// # Examples
///
/// ```ignore
/// let token = generate_token(8)?;
/// assert_eq!(token.len(), 11);
/// ```
pub fn generate_token(size: usize) -> Result<String, AppError> {
    let mut buffer = vec![0u8; size];

    getrandom::fill(&mut buffer).map_err(|e| {
        AppError::internal(
            "Random source unavailable",
            json!({ "reason": e.to_string() }),
        )
    })?;

    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buffer))
}
