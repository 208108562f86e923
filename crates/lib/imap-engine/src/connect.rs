//! IMAP connect and authenticate routine.

use crate::auth::XOAuth2Authenticator;

/// The effective data stream type we use.
pub type Stream = tokio_rustls::client::TlsStream<tokio::net::TcpStream>;

/// The effective session type we use.
pub type Session = async_imap::Session<Stream>;

/// How to secure the IMAP connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TlsMode {
    /// Implicit TLS (usually port 993).
    Implicit,

    /// Start with plaintext and upgrade using STARTTLS (usually port 143).
    StartTls,
}

/// IMAP connect params.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    /// Hostname or IP address of the IMAP server.
    pub host: String,

    /// IMAP port.
    pub port: u16,

    /// TLS mode.
    pub tls_mode: TlsMode,

    /// TLS server name (SNI).
    pub tls_server_name: String,

    /// The user for XOAUTH2 authentication, typically an email address.
    pub user: String,

    /// The OAuth2 access token for XOAUTH2 authentication.
    pub access_token: String,
}

/// Errors returned while connecting and authenticating.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Network I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to load system root certificates.
    #[error("failed to load system root certificates: {0}")]
    RootCerts(#[from] rustls_native_certs::Error),

    /// Invalid DNS name for TLS verification.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(String),

    /// IMAP protocol error.
    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// The server did not send the expected greeting.
    #[error("IMAP server sent no greeting")]
    MissingGreeting,

    /// XOAUTH2 authentication was rejected.
    #[error("XOAUTH2 authentication failed: {0}")]
    Auth(#[source] async_imap::error::Error),
}

/// Connect to the IMAP server and authenticate via XOAUTH2.
pub(crate) async fn establish(params: &ConnectParams) -> Result<Session, ConnectError> {
    tracing::debug!(
        imap_host = %params.host,
        imap_port = params.port,
        imap_tls_mode = ?params.tls_mode,
        tls_server_name = %params.tls_server_name,
        "connecting to an IMAP server"
    );

    let connector = build_tls_connector()?;
    let server_name = rustls::pki_types::ServerName::try_from(params.tls_server_name.clone())
        .map_err(|_| ConnectError::InvalidDnsName(params.tls_server_name.clone()))?;

    let tcp_stream = tokio::net::TcpStream::connect((params.host.as_str(), params.port)).await?;
    let client = secure(params.tls_mode, tcp_stream, connector, server_name).await?;

    let authenticator = XOAuth2Authenticator::new(&params.user, &params.access_token);
    let session = client
        .authenticate("XOAUTH2", authenticator)
        .await
        .map_err(|(err, _client)| ConnectError::Auth(err))?;

    Ok(session)
}

/// Build a TLS connector trusting the system root certificates.
fn build_tls_connector() -> Result<tokio_rustls::TlsConnector, ConnectError> {
    let loaded = rustls_native_certs::load_native_certs();
    if let Some(error) = loaded.errors.into_iter().next() {
        return Err(ConnectError::RootCerts(error));
    }

    let mut roots = rustls::RootCertStore::empty();
    let (trusted, ignored) = roots.add_parsable_certificates(loaded.certs);
    tracing::trace!(trusted, ignored, "loaded system root certificates");

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(tokio_rustls::TlsConnector::from(std::sync::Arc::new(config)))
}

/// Secure the raw TCP stream and consume the server greeting.
///
/// Implicit mode wraps the stream in TLS before the greeting; STARTTLS
/// reads the greeting in plaintext, upgrades, and continues on the
/// encrypted stream.
async fn secure(
    tls_mode: TlsMode,
    tcp_stream: tokio::net::TcpStream,
    connector: tokio_rustls::TlsConnector,
    server_name: rustls::pki_types::ServerName<'static>,
) -> Result<async_imap::Client<Stream>, ConnectError> {
    match tls_mode {
        TlsMode::Implicit => {
            let stream = connector.connect(server_name, tcp_stream).await?;
            let mut client = async_imap::Client::new(stream);
            greet(&mut client).await?;
            Ok(client)
        }
        TlsMode::StartTls => {
            let mut plain = async_imap::Client::new(tcp_stream);
            greet(&mut plain).await?;
            plain.run_command_and_check_ok("STARTTLS", None).await?;
            let stream = connector.connect(server_name, plain.into_inner()).await?;
            Ok(async_imap::Client::new(stream))
        }
    }
}

/// Wait for the server greeting.
async fn greet<S>(client: &mut async_imap::Client<S>) -> Result<(), ConnectError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + std::fmt::Debug,
{
    client
        .read_response()
        .await
        .ok_or(ConnectError::MissingGreeting)??;
    Ok(())
}
