//! Page-automation collaborators.
//!
//! Both variants enforce their own timeout; the watcher adds none.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use inboxhook_core::{AutomationTarget, Config, DispatchError, PageAutomation, StateStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Environment variable through which a spawned program finds its state file.
pub const STATE_PATH_ENV: &str = "INBOXHOOK_STATE_PATH";

/// The collaborator selected by configuration.
#[derive(Debug)]
pub enum Automation {
    /// External program.
    Command(CommandAutomation),
    /// HTTP endpoint.
    Http(HttpAutomation),
}

impl Automation {
    /// Builds the collaborator named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(match &config.automation {
            AutomationTarget::Command { program, args } => Self::Command(CommandAutomation {
                program: program.clone(),
                args: args.clone(),
                timeout: config.automation_timeout,
                state_path: config.state_path.clone(),
            }),
            AutomationTarget::Endpoint(url) => Self::Http(HttpAutomation::new(
                url.clone(),
                config.automation_timeout,
                StateStore::new(&config.state_path),
            )?),
        })
    }
}

impl PageAutomation for Automation {
    async fn automate(&self, url: &str) -> Result<(), DispatchError> {
        match self {
            Self::Command(command) => command.automate(url).await,
            Self::Http(http) => http.automate(url).await,
        }
    }
}

/// Runs a program with the link as its last argument.
///
/// Exit status 0 is success; otherwise stderr becomes the failure message.
#[derive(Debug, Clone)]
pub struct CommandAutomation {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    state_path: PathBuf,
}

impl PageAutomation for CommandAutomation {
    async fn automate(&self, url: &str) -> Result<(), DispatchError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(url)
            .env(STATE_PATH_ENV, &self.state_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| DispatchError::Unavailable(format!("{}: {e}", self.program)))?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DispatchError::Timeout(self.timeout))?
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(output = %stdout.trim(), "automation output");
        }

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(DispatchError::Failed(if stderr.is_empty() {
            format!("{} exited with {}", self.program, output.status)
        } else {
            stderr
        }))
    }
}

#[derive(Debug, Serialize)]
struct AutomateRequest<'a> {
    url: &'a str,
    state: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AutomateResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    state: Option<Value>,
}

/// POSTs the link and the saved state to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpAutomation {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    state: StateStore,
}

impl HttpAutomation {
    /// Creates a collaborator for `endpoint`.
    pub fn new(endpoint: Url, timeout: Duration, state: StateStore) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("inboxhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            timeout,
            state,
        })
    }
}

impl PageAutomation for HttpAutomation {
    async fn automate(&self, url: &str) -> Result<(), DispatchError> {
        let request = AutomateRequest {
            url,
            state: self.state.load(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(self.timeout)
                } else {
                    DispatchError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let reply: AutomateResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Failed(format!("HTTP {status}, unreadable reply: {e}")))?;

        if let Some(state) = &reply.state
            && let Err(e) = self.state.save(state)
        {
            tracing::warn!(error = %e, "could not persist automation state");
        }

        if reply.ok {
            Ok(())
        } else {
            Err(DispatchError::Failed(
                reply.error.unwrap_or_else(|| format!("HTTP {status}")),
            ))
        }
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
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    const URL: &str = "https://www.netflix.com/account/update-primary-location?token=abc";

    fn sh(script: &str, timeout: Duration) -> CommandAutomation {
        CommandAutomation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            timeout,
            state_path: PathBuf::from("/tmp/inboxhook-test-state.json"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_url_and_state_path() {
        let automation = sh(
            r#"test "$1" = "https://www.netflix.com/account/update-primary-location?token=abc" && test "$INBOXHOOK_STATE_PATH" = /tmp/inboxhook-test-state.json"#,
            Duration::from_secs(10),
        );
        automation.automate(URL).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_carries_stderr() {
        let automation = sh(
            "echo 'confirm button not found' >&2; exit 3",
            Duration::from_secs(10),
        );
        let err = automation.automate(URL).await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed(ref m) if m == "confirm button not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_without_stderr() {
        let automation = sh("exit 2", Duration::from_secs(10));
        let err = automation.automate(URL).await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed(ref m) if m.starts_with("sh exited with")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let automation = sh("sleep 5", Duration::from_millis(100));
        let err = automation.automate(URL).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_command_missing_program() {
        let automation = CommandAutomation {
            program: "inboxhook-no-such-program".to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(1),
            state_path: PathBuf::from("state.json"),
        };
        let err = automation.automate(URL).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unavailable(_)));
    }

    /// Serves one request with `reply` and returns the request body.
    async fn serve_once(listener: TcpListener, reply: &'static str) -> Value {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let body_start = loop {
            let mut chunk = [0u8; 1024];
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        while buf.len() < body_start + length {
            let mut chunk = [0u8; 1024];
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body");
            buf.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
            reply.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        serde_json::from_slice(&buf[body_start..body_start + length]).unwrap()
    }

    async fn endpoint(listener: &TcpListener) -> Url {
        let addr = listener.local_addr().unwrap();
        Url::parse(&format!("http://{addr}/automate")).unwrap()
    }

    #[tokio::test]
    async fn test_http_sends_state_and_persists_reply_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.save(&json!({"session": "old"})).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let automation =
            HttpAutomation::new(endpoint(&listener).await, Duration::from_secs(10), store.clone())
                .unwrap();
        let server = tokio::spawn(serve_once(listener, r#"{"ok":true,"state":{"session":"new"}}"#));

        automation.automate(URL).await.unwrap();

        let request = server.await.unwrap();
        assert_eq!(request["url"], URL);
        assert_eq!(request["state"], json!({"session": "old"}));
        assert_eq!(store.load(), Some(json!({"session": "new"})));
    }

    #[tokio::test]
    async fn test_http_reported_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let automation =
            HttpAutomation::new(endpoint(&listener).await, Duration::from_secs(10), store.clone())
                .unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            r#"{"ok":false,"error":"link expired"}"#,
        ));

        let err = automation.automate(URL).await.unwrap_err();

        let request = server.await.unwrap();
        assert_eq!(request["state"], Value::Null);
        assert!(matches!(err, DispatchError::Failed(ref m) if m == "link expired"));
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_http_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = endpoint(&listener).await;
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let automation = HttpAutomation::new(
            url,
            Duration::from_secs(5),
            StateStore::new(dir.path().join("state.json")),
        )
        .unwrap();
        let err = automation.automate(URL).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unavailable(_)));
    }
}
