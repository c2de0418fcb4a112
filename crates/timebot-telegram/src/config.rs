//! Runtime configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use timebot_core::config as paths;
use timebot_core::pagination::DEFAULT_PER_PAGE;
use tracing::warn;
use url::Url;

use crate::error::{BotError, Result};

/// Default lifetime of an abandoned dialog.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default bound on any single store or Bot API call.
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of a deep-link token.
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(120);

const DEFAULT_LINK_BASE_URL: &str = "http://localhost:8080/telegram/link";

/// Knobs the dispatcher and dialogs read on every update.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Bot part of the session key.
    pub bot_id: String,
    pub session_ttl: Duration,
    pub external_timeout: Duration,
    /// Rows per page in entry lists.
    pub page_size: usize,
    /// Page the user opens to finish account linking.
    pub link_base_url: Url,
    pub link_ttl: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            bot_id: "timebot".to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
            page_size: DEFAULT_PER_PAGE,
            link_base_url: Url::parse(DEFAULT_LINK_BASE_URL).expect("valid default link URL"),
            link_ttl: DEFAULT_LINK_TTL,
        }
    }
}

/// Webhook listener settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub host: String,
    pub port: u16,
    /// Route Telegram posts updates to.
    pub path: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` value.
    pub secret: Option<String>,
    /// Externally reachable URL registered with `setWebhook`.
    pub public_url: Option<Url>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8443,
            path: "/telegram/webhook".to_string(),
            secret: None,
            public_url: None,
        }
    }
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub dispatch: DispatchSettings,
    /// HMAC key for deep-link tokens.
    pub link_secret: String,
    /// Shared secret the account service sends to `POST /link`.
    pub link_api_secret: Option<String>,
    pub webhook: WebhookConfig,
    pub data_file: PathBuf,
    pub sessions_dir: PathBuf,
    /// `TIMEBOT_BOT_ID` was set explicitly.
    pub bot_id_explicit: bool,
}

impl BotConfig {
    /// Reads the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let token = env_string("TELEGRAM_BOT_TOKEN").ok_or(BotError::NoToken)?;

        let mut dispatch = DispatchSettings::default();
        let bot_id = env_string("TIMEBOT_BOT_ID");
        let bot_id_explicit = bot_id.is_some();
        if let Some(bot_id) = bot_id {
            dispatch.bot_id = bot_id;
        }
        if let Some(days) = env_parse::<u64>("TIMEBOT_SESSION_TTL_DAYS")? {
            dispatch.session_ttl = Duration::from_secs(days * 24 * 60 * 60);
        }
        if let Some(secs) = env_parse::<u64>("TIMEBOT_EXTERNAL_TIMEOUT_SECS")? {
            dispatch.external_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(size) = env_parse::<usize>("TIMEBOT_PAGE_SIZE")? {
            if size == 0 {
                return Err(BotError::Config("TIMEBOT_PAGE_SIZE must be positive".into()));
            }
            dispatch.page_size = size;
        }
        if let Some(url) = env_parse::<Url>("TIMEBOT_LINK_BASE_URL")? {
            dispatch.link_base_url = url;
        }
        if let Some(secs) = env_parse::<u64>("TIMEBOT_LINK_TTL_SECS")? {
            dispatch.link_ttl = Duration::from_secs(secs);
        }

        let link_secret = match env_string("TIMEBOT_LINK_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("TIMEBOT_LINK_SECRET not set, link tokens will not survive a restart");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
        };

        let mut webhook = WebhookConfig::default();
        if let Some(host) = env_string("TIMEBOT_WEBHOOK_HOST") {
            webhook.host = host;
        }
        if let Some(port) = env_parse::<u16>("TIMEBOT_WEBHOOK_PORT")? {
            webhook.port = port;
        }
        if let Some(path) = env_string("TIMEBOT_WEBHOOK_PATH") {
            webhook.path = normalize_path(&path);
        }
        webhook.secret = env_string("TIMEBOT_WEBHOOK_SECRET");
        webhook.public_url = env_parse::<Url>("TIMEBOT_WEBHOOK_URL")?;

        Ok(Self {
            token,
            dispatch,
            link_secret,
            link_api_secret: env_string("TIMEBOT_LINK_API_SECRET"),
            webhook,
            data_file: paths::data_file(),
            sessions_dir: paths::sessions_dir(),
            bot_id_explicit,
        })
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses an optional variable; a present but malformed value is an error.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| BotError::Config(format!("{name}={raw:?}: {e}")))
        })
        .transpose()
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}
