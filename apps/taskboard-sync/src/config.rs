use std::time::Duration;

/// Client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// REST API base URL (e.g. `http://localhost:8080/api`).
    pub api_url: String,
    /// Gateway WebSocket endpoint (e.g. `ws://localhost:8080/ws/websocket`).
    pub gateway_url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Heartbeat interval offered in both directions.
    pub heartbeat_interval: Duration,
    /// How long to wait for the server's handshake reply.
    pub handshake_timeout: Duration,
    /// How often the unread notification count is re-fetched.
    pub unread_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            gateway_url: "ws://localhost:8080/ws/websocket".to_string(),
            reconnect_delay: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_millis(4000),
            handshake_timeout: Duration::from_secs(10),
            unread_poll_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// local development defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: optional_var("API_URL").unwrap_or(defaults.api_url),
            gateway_url: optional_var("GATEWAY_URL").unwrap_or(defaults.gateway_url),
            reconnect_delay: millis_var("RECONNECT_DELAY_MS").unwrap_or(defaults.reconnect_delay),
            heartbeat_interval: millis_var("HEARTBEAT_INTERVAL_MS")
                .unwrap_or(defaults.heartbeat_interval),
            handshake_timeout: optional_var("HANDSHAKE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.handshake_timeout),
            unread_poll_interval: optional_var("UNREAD_POLL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.unread_poll_interval),
        }
    }
}

/// Login credentials for the command-line client.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            username: required_var("TASKBOARD_USERNAME"),
            password: required_var("TASKBOARD_PASSWORD"),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn millis_var(name: &str) -> Option<Duration> {
    optional_var(name)
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
