//! Core mail domain types shared across the gateway.

/// Upstream account backend protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Protocol {
    /// IMAP with XOAUTH2 bearer authentication.
    #[serde(rename = "IMAP")]
    Imap,

    /// Microsoft Graph mail HTTP API.
    #[serde(rename = "GRAPH")]
    Graph,

    /// Not yet detected.
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Protocol {
    /// Stable wire name of the protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imap => "IMAP",
            Self::Graph => "GRAPH",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mail service provider.
#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ServiceProvider {
    /// Microsoft consumer accounts.
    #[serde(rename = "MICROSOFT")]
    Microsoft,

    /// Google accounts.
    #[serde(rename = "GOOGLE")]
    Google,
}

impl ServiceProvider {
    /// Stable wire name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Microsoft => "MICROSOFT",
            Self::Google => "GOOGLE",
        }
    }
}

impl std::fmt::Display for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request mail account credentials and routing info.
///
/// Constructed from the caller on every request, never persisted.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAccount {
    /// Mailbox address.
    pub email: String,

    /// OAuth2 application client id.
    pub client_id: String,

    /// Long-lived OAuth2 refresh credential.
    pub refresh_token: String,

    /// Backend protocol the account uses.
    #[serde(default = "unknown_protocol")]
    pub protocol: Protocol,

    /// Mail service provider.
    pub service_provider: ServiceProvider,
}

fn unknown_protocol() -> Protocol {
    Protocol::Unknown
}

/// A display name plus address pair from a mail header.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EmailAddress {
    /// Display name; empty when redundant with the address.
    pub name: String,

    /// The address itself.
    pub address: String,
}

/// Canonical email record emitted to clients.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Email {
    /// Message identifier (Message-ID without angle brackets, or the
    /// upstream API id).
    pub id: String,

    /// Subject line.
    pub subject: String,

    /// First sender address.
    pub from: Option<EmailAddress>,

    /// First recipient address.
    pub to: Option<EmailAddress>,

    /// Delivery date as an RFC 3339 string.
    pub date: String,

    /// First text/plain body part.
    pub text: String,

    /// First text/html body part.
    pub html: String,
}

/// Drop a display name that merely repeats the address.
///
/// Both fields are otherwise preserved verbatim from the source header.
pub fn clean_email_address(name: &str, address: &str) -> EmailAddress {
    let name = if name == address { "" } else { name };
    EmailAddress {
        name: name.to_string(),
        address: address.to_string(),
    }
}
