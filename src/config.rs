// src/config.rs
use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_AMI_PORT: u16 = 5038;
pub const DEFAULT_CONTEXT: &str = "from-internal";

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub ami: ConnectionParams,
    pub session: SessionOptions,
}

/// Where and as whom to open an AMI session.
///
/// Any empty field leaves status polling disabled.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
}

impl ConnectionParams {
    pub fn new(host: &str, port: u16, username: &str, secret: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty()
            && self.port != 0
            && !self.username.is_empty()
            && !self.secret.is_empty()
    }

    pub fn server_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Per-session timeouts and dialplan context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub banner_timeout: Duration,
    /// Bounds each request/response pair, and the logoff and close steps
    pub exchange_timeout: Duration,
    pub context: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            banner_timeout: Duration::from_secs(2),
            exchange_timeout: Duration::from_secs(3),
            context: DEFAULT_CONTEXT.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = SessionOptions::default();

        Ok(Config {
            environment: get("ENVIRONMENT").unwrap_or_else(|| "production".to_string()),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: get("PORT").unwrap_or_else(|| "9000".to_string()).parse()?,
            ami: ConnectionParams {
                host: get("AMI_HOST").unwrap_or_default(),
                port: match get("AMI_PORT") {
                    Some(port) => port.parse()?,
                    None => DEFAULT_AMI_PORT,
                },
                username: get("AMI_USERNAME").unwrap_or_default(),
                secret: get("AMI_SECRET").unwrap_or_default(),
            },
            session: SessionOptions {
                connect_timeout: Self::parse_millis(get("AMI_CONNECT_TIMEOUT_MS"), defaults.connect_timeout)?,
                banner_timeout: Self::parse_millis(get("AMI_BANNER_TIMEOUT_MS"), defaults.banner_timeout)?,
                exchange_timeout: Self::parse_millis(get("AMI_EXCHANGE_TIMEOUT_MS"), defaults.exchange_timeout)?,
                context: get("AMI_CONTEXT").unwrap_or(defaults.context),
            },
        })
    }

    fn parse_millis(
        value: Option<String>,
        default: Duration,
    ) -> Result<Duration, Box<dyn std::error::Error>> {
        match value {
            Some(ms) => {
                let ms: u64 = ms.parse()?;
                if ms == 0 {
                    return Err("AMI timeouts must be greater than zero".into());
                }
                Ok(Duration::from_millis(ms))
            }
            None => Ok(default),
        }
    }
}
