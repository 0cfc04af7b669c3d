use clap::{Args, Parser};
use std::path::PathBuf;

use crate::config::{
    ClientConfig, ConfigError, DEFAULT_HUB_PATH, DEFAULT_SERVER, HubTarget, SessionId,
    WakeLockMode, parse_page_url,
};
use crate::session::{DEFAULT_SEARCH_KEYWORD, QueuePolicy, SessionConfig};
use crate::suggest::{DEFAULT_SUGGEST_LIMIT, SUGGEST_DEBOUNCE};
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "karaoke-remote",
    about = "🎤  Control a karaoke host session from the terminal",
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("BUILD_TIMESTAMP"))
)]
pub struct Cli {
    #[arg(
        long,
        env = "KARAOKE_REMOTE_URL",
        value_name = "URL",
        help = "Remote page URL as printed in the host's QR code (carries ?sid=)"
    )]
    pub url: Option<String>,

    #[arg(
        long,
        env = "KARAOKE_SID",
        value_name = "SID",
        help = "Session id; overrides the one embedded in --url"
    )]
    pub sid: Option<String>,

    #[arg(
        long,
        env = "KARAOKE_HUB_BASE",
        value_name = "URL",
        help = "Hub server base URL (defaults to the origin of --url, then localhost:5000)"
    )]
    pub server: Option<String>,

    #[arg(
        long = "hub-path",
        env = "KARAOKE_HUB_PATH",
        default_value = DEFAULT_HUB_PATH,
        help = "Path of the remote hub under the server base URL"
    )]
    pub hub_path: String,

    #[arg(
        long = "fallback-only",
        env = "KARAOKE_FALLBACK_ONLY",
        help = "Skip the direct WebSocket and always negotiate first"
    )]
    pub fallback_only: bool,

    #[arg(
        long = "suggest-limit",
        env = "KARAOKE_SUGGEST_LIMIT",
        default_value_t = DEFAULT_SUGGEST_LIMIT,
        help = "Maximum suggestions requested per keystroke burst"
    )]
    pub suggest_limit: u32,

    #[arg(
        long = "default-search",
        env = "KARAOKE_DEFAULT_SEARCH",
        default_value = DEFAULT_SEARCH_KEYWORD,
        help = "Keyword searched once the host first reports its state"
    )]
    pub default_search: String,

    #[arg(
        long = "max-reconnect-attempts",
        env = "KARAOKE_MAX_RECONNECT_ATTEMPTS",
        value_name = "N",
        help = "Give up automatic reconnects after N attempts (default: never)"
    )]
    pub max_reconnect_attempts: Option<u32>,

    #[arg(
        long = "queue-capacity",
        env = "KARAOKE_QUEUE_CAPACITY",
        value_name = "N",
        help = "Drop new offline commands once N are waiting (default: unbounded)"
    )]
    pub queue_capacity: Option<usize>,

    #[arg(
        long = "coalesce-op",
        value_name = "OP",
        help = "Keep only the latest queued message for this op (repeatable)"
    )]
    pub coalesce_ops: Vec<String>,

    #[arg(
        long = "wake-lock",
        value_enum,
        env = "KARAOKE_WAKE_LOCK",
        default_value_t = WakeLockMode::None,
        help = "How to keep the machine awake while the remote is visible"
    )]
    pub wake_lock: WakeLockMode,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "KARAOKE_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "KARAOKE_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

impl Cli {
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let page = self.url.as_deref().map(parse_page_url).transpose()?;
        let sid = SessionId::resolve(self.sid.as_deref(), page.as_ref())?;
        let hub = match (self.server.as_deref(), page.as_ref()) {
            (Some(server), _) => HubTarget::new(server, &self.hub_path)?,
            (None, Some(page)) => HubTarget::same_origin(page, &self.hub_path)?,
            (None, None) => HubTarget::new(DEFAULT_SERVER, &self.hub_path)?,
        };

        let mut session = SessionConfig::new(sid);
        session.prefer_primary = !self.fallback_only;
        session.default_search = self.default_search.clone();
        session.policy.max_reconnect_attempts = self.max_reconnect_attempts;
        session.queue = QueuePolicy {
            capacity: self.queue_capacity,
            coalesce_ops: self
                .coalesce_ops
                .iter()
                .map(|op| op.trim().to_string())
                .filter(|op| !op.is_empty())
                .collect(),
        };

        Ok(ClientConfig {
            session,
            hub,
            suggest_limit: self.suggest_limit,
            suggest_debounce: SUGGEST_DEBOUNCE,
            wake_lock: self.wake_lock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["karaoke-remote"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn page_url_supplies_sid_and_hub_origin() {
        let cli = parse(&["--url", "http://192.168.0.7:5000/remote?sid=abc123"]);
        let config = cli.client_config().unwrap();
        assert_eq!(config.session.sid.as_str(), "abc123");
        assert_eq!(
            config.hub.hub_url().as_str(),
            "http://192.168.0.7:5000/hubs/remote"
        );
        assert!(config.session.prefer_primary);
        assert_eq!(config.session.default_search, "karaoke");
        assert_eq!(config.session.queue, QueuePolicy::default());
    }

    #[test]
    fn explicit_flags_override_page() {
        let cli = parse(&[
            "--url",
            "http://192.168.0.7:5000/remote?sid=abc123",
            "--sid",
            "zz9",
            "--server",
            "karaoke.example",
            "--hub-path",
            "/rt/remote",
            "--fallback-only",
            "--queue-capacity",
            "16",
            "--coalesce-op",
            "search_suggest",
            "--coalesce-op",
            "search",
            "--max-reconnect-attempts",
            "5",
            "--wake-lock",
            "inhibit",
        ]);
        let config = cli.client_config().unwrap();
        assert_eq!(config.session.sid.as_str(), "zz9");
        assert_eq!(config.hub.hub_url().as_str(), "https://karaoke.example/rt/remote");
        assert!(!config.session.prefer_primary);
        assert_eq!(config.session.queue.capacity, Some(16));
        assert_eq!(config.session.queue.coalesce_ops.len(), 2);
        assert_eq!(config.session.policy.max_reconnect_attempts, Some(5));
        assert_eq!(config.wake_lock, WakeLockMode::Inhibit);
    }

    #[test]
    fn missing_sid_is_a_config_error() {
        let cli = parse(&["--server", "localhost:5000"]);
        assert_eq!(cli.client_config().unwrap_err(), ConfigError::MissingSessionId);
    }
}
