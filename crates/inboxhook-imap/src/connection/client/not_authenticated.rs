//! Implementation for the not-authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, NotAuthenticated};
use super::{Client, DEFAULT_IO_TIMEOUT};
use crate::command::{Command, TagGenerator};
use crate::connection::config::{Config, Security};
use crate::connection::framed::FramedStream;
use crate::connection::stream::{ImapStream, connect_plain, connect_tls};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting and any capabilities it advertises.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response_within(DEFAULT_IO_TIMEOUT).await?;
        let response = ResponseParser::parse(&greeting)?;

        let mut capabilities = Vec::new();
        match response {
            Response::Untagged(
                UntaggedResponse::Ok { code, .. } | UntaggedResponse::PreAuth { code, .. },
            ) => {
                if let Some(ResponseCode::Capability(caps)) = code {
                    capabilities = caps;
                }
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            io_timeout: DEFAULT_IO_TIMEOUT,
            notifications: 0,
            state: NotAuthenticated,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// Consumes self and returns an authenticated client on success. A NO
    /// reply becomes [`Error::Auth`].
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if self.login_disabled() {
            return Err(Error::Auth(
                "server advertises LOGINDISABLED on this connection".to_string(),
            ));
        }

        let tag = self
            .send(&Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        let responses = self.read_until_tagged(&tag).await?;
        match Self::check_tagged_ok(&responses, &tag) {
            Ok(()) => {}
            Err(Error::No(text)) => return Err(Error::Auth(text)),
            Err(e) => return Err(e),
        }

        // Capabilities often change after login; refresh unless the reply
        // already carried them.
        if !self.absorb_capabilities(&responses) {
            self.capability().await?;
        }

        tracing::debug!(
            idle = self.supports_idle(),
            capabilities = self.capabilities.len(),
            "logged in"
        );
        Ok(self.transition(Authenticated))
    }
}

impl Client<ImapStream, NotAuthenticated> {
    /// Connects to the configured server and reads the greeting.
    ///
    /// TCP connect, TLS handshake, greeting and any STARTTLS exchange are
    /// bounded together by `config.connect_timeout`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let limit = config.connect_timeout;
        let client = tokio::time::timeout(limit, Self::establish(config))
            .await
            .map_err(|_| Error::Timeout(limit))??;
        Ok(client.with_io_timeout(config.io_timeout))
    }

    async fn establish(config: &Config) -> Result<Self> {
        tracing::debug!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "connecting"
        );
        match config.security {
            Security::Implicit => {
                let stream = connect_tls(&config.host, config.port).await?;
                Self::from_stream(stream).await
            }
            Security::StartTls => {
                let stream = connect_plain(&config.host, config.port).await?;
                Self::from_stream(stream)
                    .await?
                    .starttls(&config.host)
                    .await
            }
            Security::None => {
                let stream = connect_plain(&config.host, config.port).await?;
                Self::from_stream(stream).await
            }
        }
    }

    /// Upgrades the connection with STARTTLS and refreshes capabilities.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if !self.capabilities.is_empty() && !self.has_capability(&Capability::StartTls) {
            return Err(Error::InvalidState(
                "server does not advertise STARTTLS".to_string(),
            ));
        }

        let tag = self.send(&Command::StartTls).await?;
        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        let tls = self.stream.into_inner().upgrade_to_tls(host).await?;
        let mut client = Self {
            stream: FramedStream::new(tls),
            tag_gen: self.tag_gen,
            // Pre-TLS capabilities must be discarded.
            capabilities: Vec::new(),
            io_timeout: self.io_timeout,
            notifications: 0,
            state: NotAuthenticated,
        };
        client.capability().await?;
        Ok(client)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_greeting_capabilities() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN] ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert!(client.supports_idle());
        assert!(client.has_capability(&Capability::Auth("PLAIN".to_string())));
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Client::from_stream(mock).await.unwrap_err();
        assert!(matches!(err, Error::Bye(ref text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn test_login_uses_capabilities_from_reply() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 LOGIN user secret\r\n")
            .read(b"W0000 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "secret").await.unwrap();
        assert!(client.supports_idle());
    }

    #[tokio::test]
    async fn test_login_refreshes_capabilities() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"W0000 LOGIN user secret\r\n")
            .read(b"W0000 OK logged in\r\n")
            .write(b"W0001 CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 IDLE\r\n")
            .read(b"W0001 OK done\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "secret").await.unwrap();
        assert!(client.supports_idle());
    }

    #[tokio::test]
    async fn test_login_rejected_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 LOGIN user wrong\r\n")
            .read(b"W0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(ref text) if text == "Invalid credentials"));
    }

    #[tokio::test]
    async fn test_login_disabled_short_circuits() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "secret").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let config = Config::builder("127.0.0.1")
            .port(1)
            .security(Security::None)
            .connect_timeout(Duration::from_secs(5))
            .build();
        let err = Client::connect(&config).await.unwrap_err();
        assert!(err.is_connection_failure());
    }
}
