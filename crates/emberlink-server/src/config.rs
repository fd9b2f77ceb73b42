use serde::Deserialize;

use emberlink_core::room_code::{CODE_ALPHABET, CODE_LENGTH};

/// Top-level server configuration, loaded from `emberlink.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub rooms: RoomsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
        }
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Messages allowed per rate-limit window, per connection.
    pub rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Outbound buffer per connection, in frames. A member whose buffer
    /// fills is treated as a dead peer and evicted.
    pub client_message_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_max: 30,
            rate_limit_window_secs: 10,
            client_message_buffer: 256,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Maximum idle duration before a room is evicted.
    pub idle_ttl_secs: u64,
    /// Janitor sweep interval.
    pub sweep_interval_secs: u64,
    pub code_length: usize,
    pub code_alphabet: String,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 300,
            sweep_interval_secs: 60,
            code_length: CODE_LENGTH,
            code_alphabet: CODE_ALPHABET.to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration, exiting on values the server cannot run
    /// with.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.limits.rate_limit_max == 0 {
            tracing::error!("limits.rate_limit_max must be > 0");
            std::process::exit(1);
        }
        if self.limits.rate_limit_window_secs == 0 {
            tracing::error!("limits.rate_limit_window_secs must be > 0");
            std::process::exit(1);
        }
        if self.limits.client_message_buffer == 0 {
            tracing::error!("limits.client_message_buffer must be > 0");
            std::process::exit(1);
        }
        if self.rooms.idle_ttl_secs == 0 {
            tracing::error!("rooms.idle_ttl_secs must be > 0");
            std::process::exit(1);
        }
        if self.rooms.sweep_interval_secs == 0 {
            tracing::error!("rooms.sweep_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.rooms.code_length == 0 {
            tracing::error!("rooms.code_length must be > 0");
            std::process::exit(1);
        }
        if self.rooms.code_alphabet.chars().count() < 2 {
            tracing::error!("rooms.code_alphabet needs at least 2 characters");
            std::process::exit(1);
        }
        if self.rooms.code_length < 4 {
            tracing::warn!(
                length = self.rooms.code_length,
                "Short room codes are easy to guess"
            );
        }
    }

    /// Load config from `emberlink.toml` if it exists, then apply env var
    /// overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("emberlink.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from emberlink.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse emberlink.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No emberlink.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("EMBERLINK_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("EMBERLINK_ROOM_TTL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.rooms.idle_ttl_secs = n;
        }
        if let Ok(val) = std::env::var("EMBERLINK_SWEEP_INTERVAL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.rooms.sweep_interval_secs = n;
        }
        if let Ok(val) = std::env::var("EMBERLINK_RATE_LIMIT_MAX")
            && let Ok(n) = val.parse::<u32>()
        {
            config.limits.rate_limit_max = n;
        }
        if let Ok(val) = std::env::var("EMBERLINK_RATE_LIMIT_WINDOW_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.limits.rate_limit_window_secs = n;
        }

        config
    }
}
