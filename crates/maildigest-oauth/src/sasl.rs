//! XOAUTH2 SASL payloads for IMAP `AUTHENTICATE XOAUTH2`.

/// Raw XOAUTH2 initial client response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
///
/// IMAP clients base64-encode SASL responses themselves, so this is what
/// an authenticator hands over.
#[must_use]
pub fn xoauth2_payload(user: &str, token: &str) -> String {
    format!("user={user}\x01auth=Bearer {token}\x01\x01")
}

/// Parses the JSON failure challenge a server sends after rejecting a token,
/// e.g. `{"status":"401","schemes":"bearer","scope":"..."}`.
///
/// # Errors
///
/// Returns an error if the challenge is not that JSON shape.
pub fn parse_oauth_error(challenge: &[u8]) -> Result<OAuthError, serde_json::Error> {
    serde_json::from_slice(challenge)
}

/// XOAUTH2 failure challenge.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuthError {
    /// HTTP-style status code.
    pub status: String,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: String,
    /// `OAuth2` scope required.
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_xoauth2_payload_format() {
        assert_eq!(
            xoauth2_payload("test@test.com", "abc"),
            "user=test@test.com\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_parse_oauth_error() {
        let json = br#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#;
        let error = parse_oauth_error(json).unwrap();

        assert_eq!(error.status, "401");
        assert_eq!(error.schemes, "bearer");
        assert_eq!(error.scope.as_deref(), Some("https://mail.google.com/"));
    }
}
