//! Remote table configuration: credentials and table location.

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use super::{RemoteError, RemoteResult};
use crate::util::{is_http_url, non_blank};

/// Default Open API base URL
pub const DEFAULT_API_BASE: &str = "https://open.feishu.cn/open-apis";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Application identity exchanged for a tenant access token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .finish()
    }
}

/// Address of one table inside a Bitable app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLocation {
    pub app_token: String,
    pub table_id: String,
}

impl FromStr for TableLocation {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_table_url(s)
    }
}

/// Parse a Bitable share URL into its app token and table id.
///
/// Accepted shapes:
/// - `https://<tenant>.feishu.cn/base/<app_token>?table=<table_id>`
/// - `https://<tenant>.feishu.cn/wiki/<app_token>?table=<table_id>&view=<view_id>`
pub fn parse_table_url(raw: &str) -> RemoteResult<TableLocation> {
    let raw = non_blank(raw).ok_or_else(|| {
        RemoteError::InvalidConfiguration("table URL must not be empty".to_string())
    })?;
    if !is_http_url(&raw) {
        return Err(RemoteError::InvalidConfiguration(
            "table URL must include http:// or https://".to_string(),
        ));
    }
    let url = Url::parse(&raw)
        .map_err(|error| RemoteError::InvalidConfiguration(format!("invalid table URL: {error}")))?;

    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty());
    let app_token = segments
        .find(|segment| matches!(*segment, "base" | "wiki"))
        .and_then(|_| segments.next())
        .map(str::to_string)
        .ok_or_else(|| {
            RemoteError::InvalidConfiguration(
                "table URL must contain /base/<app_token> or /wiki/<app_token>".to_string(),
            )
        })?;

    let table_id = url
        .query_pairs()
        .find(|(key, _)| key == "table")
        .and_then(|(_, value)| non_blank(&value))
        .ok_or_else(|| {
            RemoteError::InvalidConfiguration(
                "table URL must contain a ?table=<table_id> parameter".to_string(),
            )
        })?;

    Ok(TableLocation {
        app_token,
        table_id,
    })
}

/// Everything needed to talk to one remote table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub credentials: Credentials,
    pub table: TableLocation,
    /// Open API base URL, without trailing slash
    pub api_base: String,
    /// Upper bound for each HTTP call
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Validate credentials and parse the table URL.
    pub fn new(credentials: Credentials, table_url: &str) -> RemoteResult<Self> {
        let app_id = non_blank(&credentials.app_id).ok_or_else(|| {
            RemoteError::InvalidConfiguration("app id must not be empty".to_string())
        })?;
        let app_secret = non_blank(&credentials.app_secret).ok_or_else(|| {
            RemoteError::InvalidConfiguration("app secret must not be empty".to_string())
        })?;

        Ok(Self {
            credentials: Credentials { app_id, app_secret },
            table: parse_table_url(table_url)?,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Point the client at a different API host (self-hosted gateway, tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> RemoteResult<Self> {
        let api_base: String = api_base.into();
        let api_base = non_blank(&api_base)
            .filter(|value| is_http_url(value))
            .ok_or_else(|| {
                RemoteError::InvalidConfiguration(
                    "API base must include http:// or https://".to_string(),
                )
            })?;
        self.api_base = api_base.trim_end_matches('/').to_string();
        Ok(self)
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
