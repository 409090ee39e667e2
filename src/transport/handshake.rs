//! Pure handshake and close-code helpers
//!
//! The handshake target is the configured endpoint with the caller identity
//! appended as query parameters: `<endpoint>?userId=<userId>&sessionId=<sessionId>`.
//! No negotiation frame follows the handshake.

use super::TransportError;
use url::Url;

/// Intentional close; suppresses reconnection
pub const CLOSE_NORMAL: u16 = 1000;

/// Connection lost without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Build the handshake URL for a session
pub fn build_handshake_target(
    endpoint: &str,
    user_id: &str,
    session_id: &str,
) -> Result<Url, TransportError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| TransportError::InvalidTarget(format!("{endpoint}: {e}")))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::InvalidTarget(format!(
            "{endpoint}: scheme must be ws or wss"
        )));
    }

    url.query_pairs_mut()
        .append_pair("userId", user_id)
        .append_pair("sessionId", session_id);
    Ok(url)
}

/// Whether a close code means the peer closed on purpose
pub fn is_clean_close(code: u16) -> bool {
    code == CLOSE_NORMAL
}
