//! Startup configuration from environment-style key/value pairs.
//!
//! Read once at startup and never mutated afterwards. Reconfiguring requires
//! a restart.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use inboxhook_imap::Security;
use url::Url;

use crate::dispatcher::SeenPolicy;
use crate::error::ConfigError;
use crate::filter::TargetFilter;
use crate::session::ImapConnector;
use crate::supervisor::ReconnectPolicy;
use crate::watcher::WatchTiming;

const DEFAULT_MAILBOX: &str = "INBOX";
const DEFAULT_MARKER: &str = "update-primary-location";
const DEFAULT_POLL_SECS: u64 = 5;

/// Mailbox connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ImapSettings {
    /// Server hostname.
    pub host: String,
    /// Explicit port; `None` uses the security mode's default.
    pub port: Option<u16>,
    /// Transport security.
    pub security: Security,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Mailbox to watch.
    pub mailbox: String,
    /// Bound on connect, TLS handshake and greeting.
    pub connect_timeout: Duration,
    /// NOOP interval for servers without IDLE.
    pub keepalive: Duration,
    /// IDLE re-issue interval.
    pub idle: Duration,
}

impl fmt::Debug for ImapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("mailbox", &self.mailbox)
            .field("connect_timeout", &self.connect_timeout)
            .field("keepalive", &self.keepalive)
            .field("idle", &self.idle)
            .finish()
    }
}

impl ImapSettings {
    /// Effective port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    /// Low-level connection parameters.
    #[must_use]
    pub fn connection_config(&self) -> inboxhook_imap::Config {
        inboxhook_imap::Config::builder(&self.host)
            .port_opt(self.port)
            .security(self.security)
            .connect_timeout(self.connect_timeout)
            .build()
    }

    /// A connector that logs in and selects the watched mailbox.
    #[must_use]
    pub fn connector(&self) -> ImapConnector {
        ImapConnector::new(
            self.connection_config(),
            &self.username,
            &self.password,
            &self.mailbox,
        )
        .idle_interval(self.idle)
        .keepalive_interval(self.keepalive)
    }
}

/// Which page-automation collaborator to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationTarget {
    /// Spawn a program with the link as its last argument.
    Command {
        /// Executable.
        program: String,
        /// Leading arguments.
        args: Vec<String>,
    },
    /// POST the link to an HTTP endpoint.
    Endpoint(Url),
}

impl fmt::Display for AutomationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { program, args } if args.is_empty() => write!(f, "command `{program}`"),
            Self::Command { program, args } => write!(f, "command `{program} {}`", args.join(" ")),
            Self::Endpoint(url) => write!(f, "endpoint {}{}", url.origin().ascii_serialization(), url.path()),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Mailbox connection.
    pub imap: ImapSettings,
    /// Target senders and subjects.
    pub targets: TargetFilter,
    /// Fallback poll interval.
    pub poll_interval: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
    /// Substring that identifies the action link.
    pub action_marker: String,
    /// The automation collaborator.
    pub automation: AutomationTarget,
    /// Timeout the collaborator enforces on itself.
    pub automation_timeout: Duration,
    /// Where the collaborator's state blob lives.
    pub state_path: PathBuf,
    /// What happens to `\Seen` when automation fails.
    pub seen_policy: SeenPolicy,
}

impl Config {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Values are trimmed; blank values
    /// count as absent.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let security = match get("IMAP_SECURITY") {
            Some(v) => Security::parse(&v).ok_or_else(|| ConfigError::Invalid {
                key: "IMAP_SECURITY",
                reason: format!("expected tls, starttls or none, got `{v}`"),
            })?,
            None => Security::Implicit,
        };
        let port = match get("IMAP_PORT") {
            Some(v) => Some(
                v.parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| ConfigError::Invalid {
                        key: "IMAP_PORT",
                        reason: "must be 1-65535".to_string(),
                    })?,
            ),
            None => None,
        };

        let imap = ImapSettings {
            host: require("IMAP_HOST")?,
            port,
            security,
            username: require("IMAP_USER")?,
            password: require("IMAP_PASSWORD")?,
            mailbox: get("IMAP_MAILBOX").unwrap_or_else(|| DEFAULT_MAILBOX.to_string()),
            connect_timeout: secs(&get, "IMAP_CONNECT_TIMEOUT_SECS", 30)?,
            keepalive: secs(&get, "IMAP_KEEPALIVE_SECS", 60)?,
            idle: secs(&get, "IMAP_IDLE_SECS", 600)?,
        };

        let subjects = target_list(&get, "TARGET_EMAIL_SUBJECTS", "TARGET_EMAIL_SUBJECT")?;
        let addresses = target_list(&get, "TARGET_EMAIL_ADDRESSES", "TARGET_EMAIL_ADDRESS")?;

        // Unlike the other intervals, a bad poll interval is not fatal.
        let poll_interval = get("POLLING_INTERVAL_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map_or(Duration::from_secs(DEFAULT_POLL_SECS), Duration::from_secs);

        let reconnect = ReconnectPolicy {
            base_delay: secs(&get, "RECONNECT_BASE_DELAY_SECS", 5)?,
            max_delay: secs(&get, "RECONNECT_MAX_DELAY_SECS", 300)?,
            max_attempts: match get("RECONNECT_MAX_ATTEMPTS") {
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                    key: "RECONNECT_MAX_ATTEMPTS",
                    reason: format!("`{v}` is not a number"),
                })?,
                None => ReconnectPolicy::default().max_attempts,
            },
        };

        let automation = match (get("AUTOMATION_COMMAND"), get("AUTOMATION_ENDPOINT")) {
            (Some(command), None) => {
                let mut parts = command.split_whitespace().map(str::to_string);
                let program = parts.next().ok_or(ConfigError::AutomationTarget)?;
                AutomationTarget::Command {
                    program,
                    args: parts.collect(),
                }
            }
            (None, Some(endpoint)) => {
                let url = Url::parse(&endpoint).map_err(|e| ConfigError::Invalid {
                    key: "AUTOMATION_ENDPOINT",
                    reason: e.to_string(),
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::Invalid {
                        key: "AUTOMATION_ENDPOINT",
                        reason: "must be an http or https URL".to_string(),
                    });
                }
                AutomationTarget::Endpoint(url)
            }
            _ => return Err(ConfigError::AutomationTarget),
        };

        let seen_policy = match get("SEEN_ON_AUTOMATION_FAILURE") {
            Some(v) => SeenPolicy::parse(&v).ok_or_else(|| ConfigError::Invalid {
                key: "SEEN_ON_AUTOMATION_FAILURE",
                reason: format!("expected keep or revert, got `{v}`"),
            })?,
            None => SeenPolicy::default(),
        };

        let state_path = match get("AUTOMATION_STATE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_state_path().ok_or(ConfigError::Missing("AUTOMATION_STATE_PATH"))?,
        };

        Ok(Self {
            imap,
            targets: TargetFilter::new(subjects, addresses),
            poll_interval,
            reconnect,
            action_marker: get("ACTION_LINK_MARKER").unwrap_or_else(|| DEFAULT_MARKER.to_string()),
            automation,
            automation_timeout: secs(&get, "AUTOMATION_TIMEOUT_SECS", 30)?,
            state_path,
            seen_policy,
        })
    }

    /// Session loop timing.
    #[must_use]
    pub const fn watch_timing(&self) -> WatchTiming {
        WatchTiming {
            poll_interval: self.poll_interval,
        }
    }
}

impl fmt::Display for Config {
    /// Summary with credentials redacted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "imap:        {}@{}:{} ({:?}), mailbox {}",
            self.imap.username,
            self.imap.host,
            self.imap.port(),
            self.imap.security,
            self.imap.mailbox
        )?;
        writeln!(f, "password:    [REDACTED]")?;
        writeln!(f, "subjects:    {}", self.targets.subjects().join(" | "))?;
        writeln!(f, "senders:     {}", self.targets.addresses().join(" | "))?;
        writeln!(
            f,
            "timing:      poll {}s, idle {}s, keepalive {}s",
            self.poll_interval.as_secs(),
            self.imap.idle.as_secs(),
            self.imap.keepalive.as_secs()
        )?;
        writeln!(
            f,
            "reconnect:   base {}s, max {}s, {} attempts",
            self.reconnect.base_delay.as_secs(),
            self.reconnect.max_delay.as_secs(),
            self.reconnect.max_attempts
        )?;
        writeln!(f, "marker:      {}", self.action_marker)?;
        writeln!(
            f,
            "automation:  {} (timeout {}s)",
            self.automation,
            self.automation_timeout.as_secs()
        )?;
        writeln!(f, "state:       {}", self.state_path.display())?;
        write!(f, "on failure:  {:?}", self.seen_policy)
    }
}

/// Default location of the automation state blob.
#[must_use]
pub fn default_state_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("inboxhook").join("automation-state.json"))
}

fn secs<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(Duration::from_secs(default));
    };
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(Duration::from_secs(n)),
        Err(_) => Err(ConfigError::Invalid {
            key,
            reason: format!("`{value}` is not a number of seconds"),
        }),
    }
}

/// Reads a pipe-delimited list, falling back to the singular key.
fn target_list<G>(get: &G, key: &'static str, singular: &str) -> Result<Vec<String>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let items: Vec<String> = get(key)
        .or_else(|| get(singular))
        .unwrap_or_default()
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        Err(ConfigError::EmptyTargets(key))
    } else {
        Ok(items)
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
    use std::collections::HashMap;

    use super::*;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("IMAP_HOST", "imap.example.com"),
            ("IMAP_USER", "watcher@example.com"),
            ("IMAP_PASSWORD", "hunter2"),
            ("TARGET_EMAIL_SUBJECTS", "Household | Temporary access code"),
            ("TARGET_EMAIL_ADDRESSES", "info@account.netflix.com|info@netflix.com"),
            ("AUTOMATION_COMMAND", "node automate.js --headless"),
            ("AUTOMATION_STATE_PATH", "/tmp/inboxhook/state.json"),
        ])
    }

    fn load(map: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| map.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base()).unwrap();
        assert_eq!(config.imap.security, Security::Implicit);
        assert_eq!(config.imap.port(), 993);
        assert_eq!(config.imap.mailbox, "INBOX");
        assert_eq!(config.imap.idle, Duration::from_secs(600));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.action_marker, "update-primary-location");
        assert_eq!(config.seen_policy, SeenPolicy::KeepSeen);
        assert_eq!(
            config.automation,
            AutomationTarget::Command {
                program: "node".to_string(),
                args: vec!["automate.js".to_string(), "--headless".to_string()],
            }
        );
    }

    #[test]
    fn test_pipe_lists_are_trimmed_and_lowercased() {
        let config = load(&base()).unwrap();
        assert_eq!(
            config.targets.subjects(),
            ["household", "temporary access code"]
        );
        assert_eq!(
            config.targets.addresses(),
            ["info@account.netflix.com", "info@netflix.com"]
        );
    }

    #[test]
    fn test_singular_keys_fallback() {
        let mut map = base();
        map.remove("TARGET_EMAIL_SUBJECTS");
        map.remove("TARGET_EMAIL_ADDRESSES");
        map.insert("TARGET_EMAIL_SUBJECT", "Household");
        map.insert("TARGET_EMAIL_ADDRESS", "info@netflix.com");
        let config = load(&map).unwrap();
        assert_eq!(config.targets.subjects(), ["household"]);
        assert_eq!(config.targets.addresses(), ["info@netflix.com"]);
    }

    #[test]
    fn test_empty_target_list_is_error() {
        let mut map = base();
        map.insert("TARGET_EMAIL_SUBJECTS", " | |");
        assert_eq!(
            load(&map).unwrap_err(),
            ConfigError::EmptyTargets("TARGET_EMAIL_SUBJECTS")
        );

        let mut map = base();
        map.remove("TARGET_EMAIL_ADDRESSES");
        assert_eq!(
            load(&map).unwrap_err(),
            ConfigError::EmptyTargets("TARGET_EMAIL_ADDRESSES")
        );
    }

    #[test]
    fn test_missing_credentials() {
        let mut map = base();
        map.insert("IMAP_PASSWORD", "   ");
        assert_eq!(load(&map).unwrap_err(), ConfigError::Missing("IMAP_PASSWORD"));
    }

    #[test]
    fn test_poll_interval_zero_or_garbage_uses_default() {
        for value in ["0", "soon", "-3"] {
            let mut map = base();
            map.insert("POLLING_INTERVAL_SECONDS", value);
            assert_eq!(load(&map).unwrap().poll_interval, Duration::from_secs(5));
        }
        let mut map = base();
        map.insert("POLLING_INTERVAL_SECONDS", "30");
        assert_eq!(load(&map).unwrap().poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_starttls_port_default() {
        let mut map = base();
        map.insert("IMAP_SECURITY", "STARTTLS");
        let config = load(&map).unwrap();
        assert_eq!(config.imap.port(), 143);
        assert_eq!(config.imap.connection_config().port, 143);
    }

    #[test]
    fn test_invalid_values() {
        let mut map = base();
        map.insert("IMAP_PORT", "70000");
        assert!(matches!(
            load(&map).unwrap_err(),
            ConfigError::Invalid { key: "IMAP_PORT", .. }
        ));

        let mut map = base();
        map.insert("IMAP_IDLE_SECS", "0");
        assert!(matches!(
            load(&map).unwrap_err(),
            ConfigError::Invalid { key: "IMAP_IDLE_SECS", .. }
        ));

        let mut map = base();
        map.insert("SEEN_ON_AUTOMATION_FAILURE", "maybe");
        assert!(matches!(
            load(&map).unwrap_err(),
            ConfigError::Invalid { key: "SEEN_ON_AUTOMATION_FAILURE", .. }
        ));
    }

    #[test]
    fn test_exactly_one_automation_target() {
        let mut map = base();
        map.insert("AUTOMATION_ENDPOINT", "http://127.0.0.1:3000/automate");
        assert_eq!(load(&map).unwrap_err(), ConfigError::AutomationTarget);

        map.remove("AUTOMATION_COMMAND");
        assert!(matches!(
            load(&map).unwrap().automation,
            AutomationTarget::Endpoint(ref url) if url.port() == Some(3000)
        ));

        map.remove("AUTOMATION_ENDPOINT");
        assert_eq!(load(&map).unwrap_err(), ConfigError::AutomationTarget);
    }

    #[test]
    fn test_endpoint_must_be_http() {
        let mut map = base();
        map.remove("AUTOMATION_COMMAND");
        map.insert("AUTOMATION_ENDPOINT", "ftp://example.com/run");
        assert!(matches!(
            load(&map).unwrap_err(),
            ConfigError::Invalid { key: "AUTOMATION_ENDPOINT", .. }
        ));
    }

    #[test]
    fn test_summary_and_debug_redact_password() {
        let config = load(&base()).unwrap();
        let summary = config.to_string();
        assert!(summary.contains("imap.example.com:993"));
        assert!(summary.contains("[REDACTED]"));
        assert!(!summary.contains("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
