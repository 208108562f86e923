//! Message fetch helpers.

use futures_util::TryStreamExt as _;
use mail_domain::Email;

use crate::EngineError;
use crate::connect::Session;

/// Partial body fetch: the first 50 KiB of the raw message.
///
/// Messages above the cap yield best-effort bodies; the parser tolerates
/// truncated MIME.
const PARTIAL_BODY_QUERY: &str = "BODY[]<0.50000>";

/// Fetch and parse the message at the given sequence number.
pub(crate) async fn fetch_by_sequence(
    session: &mut Session,
    sequence: u32,
) -> Result<Option<Email>, EngineError> {
    let mut raw: Option<Vec<u8>> = None;
    {
        let mut fetches = session
            .fetch(sequence.to_string(), PARTIAL_BODY_QUERY)
            .await?;
        while let Some(fetch) = fetches.try_next().await? {
            if raw.is_none()
                && let Some(body) = fetch.body()
            {
                raw = Some(body.to_vec());
            }
        }
    }

    let Some(raw) = raw else {
        return Ok(None);
    };

    let email = mail_parse::parse_email(&raw)?;
    tracing::debug!(message_id = %email.id, sequence, "fetched message");
    Ok(Some(email))
}

/// Find the sequence number of the message with the given Message-ID.
pub(crate) async fn search_by_message_id(
    session: &mut Session,
    email_id: &str,
) -> Result<u32, EngineError> {
    let query = format!("HEADER Message-ID {}", quote_search_value(email_id)?);
    let matches = session.search(query).await?;

    matches
        .into_iter()
        .min()
        .ok_or_else(|| EngineError::MessageNotFound(email_id.to_string()))
}

/// Encode a caller-supplied value as an IMAP quoted string.
///
/// The value comes straight from the request, so it must not be able to
/// break out of the SEARCH command: CR and LF are rejected outright, quote
/// and backslash are escaped.
fn quote_search_value(value: &str) -> Result<String, EngineError> {
    if value.contains(['\r', '\n']) {
        return Err(EngineError::InvalidMessageId(value.to_string()));
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Ok(quoted)
}
