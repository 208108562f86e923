//! XOAUTH2 SASL authentication.

/// Build the XOAUTH2 initial client response.
pub(crate) fn initial_response(user: &str, access_token: &str) -> String {
    format!("user={user}\x01auth=Bearer {access_token}\x01\x01")
}

/// SASL client for the XOAUTH2 mechanism.
///
/// The first challenge is answered with the bearer payload; any later
/// challenge (the server reporting an authentication problem) is answered
/// with an empty response so the server completes the exchange with its
/// final status.
pub(crate) struct XOAuth2Authenticator<'a> {
    /// The user, typically an email address.
    user: &'a str,

    /// The OAuth2 access token.
    access_token: &'a str,

    /// Whether the initial response has been sent.
    responded: bool,
}

impl<'a> XOAuth2Authenticator<'a> {
    /// Create an authenticator for the given credentials.
    pub(crate) fn new(user: &'a str, access_token: &'a str) -> Self {
        Self {
            user,
            access_token,
            responded: false,
        }
    }
}

impl async_imap::Authenticator for XOAuth2Authenticator<'_> {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        if self.responded {
            return String::new();
        }
        self.responded = true;
        initial_response(self.user, self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use async_imap::Authenticator as _;

    use super::*;

    #[test]
    fn encodes_user_and_bearer_token() {
        let response = initial_response("user@example.com", "tok123");
        assert_eq!(response, "user=user@example.com\x01auth=Bearer tok123\x01\x01");
    }

    #[test]
    fn first_challenge_gets_the_payload_then_empty_responses() {
        let mut authenticator = XOAuth2Authenticator::new("user@example.com", "tok123");

        let first = authenticator.process(b"");
        assert_eq!(first, initial_response("user@example.com", "tok123"));

        let second = authenticator.process(b"eyJzdGF0dXMiOiI0MDEifQ==");
        assert_eq!(second, "");

        let third = authenticator.process(b"");
        assert_eq!(third, "");
    }
}
