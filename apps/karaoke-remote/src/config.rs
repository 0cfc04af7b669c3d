use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;
use url::{Host, Url};

use crate::session::SessionConfig;

pub const DEFAULT_HUB_PATH: &str = "/hubs/remote";
pub const DEFAULT_SERVER: &str = "localhost:5000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no session id: pass --sid or a remote page url carrying ?sid=")]
    MissingSessionId,
    #[error("invalid remote page url: {0}")]
    InvalidPageUrl(String),
    #[error("invalid hub url: {0}")]
    InvalidHubUrl(String),
}

/// Identifier of the host session this remote controls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingSessionId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Reads the `sid` query parameter of the remote page URL.
    pub fn from_page_url(page: &Url) -> Result<Self, ConfigError> {
        page.query_pairs()
            .find(|(key, _)| key == "sid")
            .map(|(_, value)| value.into_owned())
            .ok_or(ConfigError::MissingSessionId)
            .and_then(|value| Self::new(&value))
    }

    /// An explicit id wins over the one embedded in the page URL.
    pub fn resolve(explicit: Option<&str>, page: Option<&Url>) -> Result<Self, ConfigError> {
        if let Some(explicit) = explicit.filter(|value| !value.trim().is_empty()) {
            return Self::new(explicit);
        }
        match page {
            Some(page) => Self::from_page_url(page),
            None => Err(ConfigError::MissingSessionId),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn parse_page_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidPageUrl(format!("{raw}: {err}")))
}

/// Where the hub lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubTarget {
    hub_url: Url,
}

impl HubTarget {
    /// `server` may omit the scheme; private and loopback hosts get `http://`,
    /// everything else `https://`.
    pub fn new(server: &str, hub_path: &str) -> Result<Self, ConfigError> {
        let mut base = server.trim().to_string();
        if base.is_empty() {
            return Err(ConfigError::InvalidHubUrl("hub server cannot be empty".into()));
        }
        if !base.contains("://") {
            let inferred_scheme = infer_scheme(&base);
            base = format!("{inferred_scheme}{base}");
        }
        let mut url = Url::parse(&base).map_err(|err| ConfigError::InvalidHubUrl(format!("{base}: {err}")))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ConfigError::InvalidHubUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            hub_path.trim().trim_start_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { hub_url: url })
    }

    /// The hub on the same origin as the remote page.
    pub fn same_origin(page: &Url, hub_path: &str) -> Result<Self, ConfigError> {
        let origin = page.origin();
        if !origin.is_tuple() {
            return Err(ConfigError::InvalidPageUrl(format!("{page} has no origin")));
        }
        Self::new(&origin.ascii_serialization(), hub_path)
    }

    pub fn hub_url(&self) -> &Url {
        &self.hub_url
    }
}

fn infer_scheme(base: &str) -> &'static str {
    // Parse with a placeholder scheme only to get at the host.
    let local = Url::parse(&format!("http://{base}"))
        .ok()
        .and_then(|url| url.host().map(|host| is_local_host(&host)))
        .unwrap_or(false);
    if local { "http://" } else { "https://" }
}

/// Loopback, unspecified, private and link-local hosts are reached over plain http.
fn is_local_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => *name == "localhost" || name.ends_with(".localhost"),
        Host::Ipv4(addr) => {
            addr.is_loopback() || addr.is_unspecified() || addr.is_private() || addr.is_link_local()
        }
        Host::Ipv6(addr) => {
            let first = addr.segments()[0];
            addr.is_loopback()
                || addr.is_unspecified()
                || first & 0xfe00 == 0xfc00
                || first & 0xffc0 == 0xfe80
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WakeLockMode {
    /// Do not hold a wake lock.
    #[default]
    None,
    /// Hold a logind inhibitor through `systemd-inhibit`.
    Inhibit,
}

/// Everything the binary needs to run one remote.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub session: SessionConfig,
    pub hub: HubTarget,
    pub suggest_limit: u32,
    pub suggest_debounce: Duration,
    pub wake_lock: WakeLockMode,
}
