//! MIME message parsing into the canonical email record.

use mail_domain::{Email, EmailAddress, clean_email_address};
use mail_parser::MimeHeaders;

/// An error that can occur while parsing a raw message.
#[derive(Debug, thiserror::Error)]
pub enum ParseMailError {
    /// The bytes do not form a parsable message.
    #[error("not a parsable mail message")]
    NotAMessage,

    /// The message carries no Date header.
    #[error("message has no date header")]
    MissingDate,
}

/// Parse a raw RFC 822 message into the canonical record.
///
/// Accepts bodies truncated by the partial fetch cap: whatever text/html
/// content survived the cut is carried over as-is. Attachments are logged by
/// filename and dropped.
pub fn parse_email(raw: &[u8]) -> Result<Email, ParseMailError> {
    let message = mail_parser::MessageParser::default()
        .parse(raw)
        .ok_or(ParseMailError::NotAMessage)?;

    let id = message
        .message_id()
        .unwrap_or_default()
        .trim_matches(['<', '>'])
        .to_string();

    let date = message
        .date()
        .ok_or(ParseMailError::MissingDate)?
        .to_rfc3339();

    let subject = message.subject().unwrap_or_default().to_string();
    let from = first_address(message.from());
    let to = first_address(message.to());

    let text = message
        .body_text(0)
        .map(|body| body.to_string())
        .unwrap_or_default();
    let html = message
        .body_html(0)
        .map(|body| body.to_string())
        .unwrap_or_default();

    for attachment in message.attachments() {
        tracing::debug!(
            filename = attachment.attachment_name().unwrap_or("<unnamed>"),
            "skipping attachment"
        );
    }

    Ok(Email {
        id,
        subject,
        from,
        to,
        date,
        text,
        html,
    })
}

fn first_address(header: Option<&mail_parser::Address<'_>>) -> Option<EmailAddress> {
    let first = header?.first()?;
    let address = first.address().unwrap_or_default();
    let name = first.name().unwrap_or_default();
    Some(clean_email_address(name, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN_MESSAGE: &str = concat!(
        "Message-ID: <abc123@mail.example.com>\r\n",
        "Date: Mon, 7 Jul 2025 09:30:00 +0000\r\n",
        "From: Alice Example <alice@example.com>\r\n",
        "To: bob@example.com <bob@example.com>\r\n",
        "Subject: hi\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "hello there\r\n",
    );

    #[test]
    fn parses_a_plain_message() {
        let email = parse_email(PLAIN_MESSAGE.as_bytes()).expect("message should parse");

        assert_eq!(email.id, "abc123@mail.example.com");
        assert_eq!(email.subject, "hi");
        assert!(email.date.starts_with("2025-07-07T09:30:00"), "date: {}", email.date);
        assert_eq!(email.text.trim_end(), "hello there");
        assert_eq!(email.html, "");

        let from = email.from.expect("sender should be present");
        assert_eq!(from.name, "Alice Example");
        assert_eq!(from.address, "alice@example.com");
    }

    #[test]
    fn clears_recipient_name_matching_the_address() {
        let email = parse_email(PLAIN_MESSAGE.as_bytes()).expect("message should parse");

        let to = email.to.expect("recipient should be present");
        assert_eq!(to.name, "");
        assert_eq!(to.address, "bob@example.com");
    }

    #[test]
    fn picks_first_text_and_html_parts_from_multipart() {
        let message = concat!(
            "Message-ID: <multi@mail.example.com>\r\n",
            "Date: Mon, 7 Jul 2025 09:30:00 +0000\r\n",
            "From: Alice Example <alice@example.com>\r\n",
            "To: Bob <bob@example.com>\r\n",
            "Subject: multipart\r\n",
            "Content-Type: multipart/alternative; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "plain body\r\n",
            "--sep\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<p>html body</p>\r\n",
            "--sep--\r\n",
        );

        let email = parse_email(message.as_bytes()).expect("message should parse");
        assert_eq!(email.text.trim_end(), "plain body");
        assert_eq!(email.html.trim_end(), "<p>html body</p>");
    }

    #[test]
    fn tolerates_a_body_truncated_mid_part() {
        let message = concat!(
            "Message-ID: <cut@mail.example.com>\r\n",
            "Date: Mon, 7 Jul 2025 09:30:00 +0000\r\n",
            "From: Alice Example <alice@example.com>\r\n",
            "To: Bob <bob@example.com>\r\n",
            "Subject: truncated\r\n",
            "Content-Type: multipart/alternative; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "the body stops mid-sent",
        );

        let email = parse_email(message.as_bytes()).expect("truncated message should still parse");
        assert_eq!(email.id, "cut@mail.example.com");
        assert_eq!(email.subject, "truncated");
    }

    #[test]
    fn missing_message_id_yields_empty_id() {
        let message = concat!(
            "Date: Mon, 7 Jul 2025 09:30:00 +0000\r\n",
            "From: Alice Example <alice@example.com>\r\n",
            "To: Bob <bob@example.com>\r\n",
            "Subject: no id\r\n",
            "\r\n",
            "body\r\n",
        );

        let email = parse_email(message.as_bytes()).expect("message should parse");
        assert_eq!(email.id, "");
    }

    #[test]
    fn missing_date_is_an_error() {
        let message = concat!(
            "Message-ID: <nodate@mail.example.com>\r\n",
            "From: Alice Example <alice@example.com>\r\n",
            "To: Bob <bob@example.com>\r\n",
            "Subject: no date\r\n",
            "\r\n",
            "body\r\n",
        );

        let result = parse_email(message.as_bytes());
        assert!(matches!(result, Err(ParseMailError::MissingDate)));
    }
}
