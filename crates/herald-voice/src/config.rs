//! Startup configuration for the herald service.
//!
//! Layering follows the usual precedence: built-in defaults, then an optional
//! TOML file (`HERALD_CONFIG` path or `config/herald.toml`), then
//! `HERALD`-prefixed environment variables. Destination ids and the
//! connection token are validated once at startup; a zero id or empty token
//! refuses to start rather than retrying.

use crate::error::{HeraldError, HeraldResult};
use crate::remote::Destination;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HeraldConfig {
    /// Guild-like group id of the voice destination. Must be non-zero.
    pub guild_id: u64,
    /// Voice channel id inside the guild. Must be non-zero.
    pub channel_id: u64,
    /// Connection credential for the remote platform. Must be non-empty.
    pub token: String,
    /// Directory where generated audio artifacts appear.
    pub outputs_dir: String,
    /// Artifact file extension, without the leading dot (e.g. "wav").
    pub artifact_ext: String,
    /// TCP port for the mute/unmute control surface.
    pub api_port: u16,
    /// Local playback command mirroring each artifact (e.g. ffplay argv).
    /// Absent means no local mirror.
    #[serde(default)]
    pub local_mirror: Option<Vec<String>>,
    /// Local output command for relayed inbound audio (raw frames on stdin).
    /// Absent means the capture relay stays disabled.
    #[serde(default)]
    pub listen_sink: Option<Vec<String>>,
    /// Seconds between connection liveness checks.
    pub connect_interval_secs: u64,
    /// Connect attempts per liveness tick before deferring to the next one.
    pub connect_attempts: u32,
    /// Per-attempt connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Delay between connect attempts within a tick, in seconds.
    pub connect_retry_delay_secs: u64,
}

impl HeraldConfig {
    /// Load config from file and environment. Precedence: env `HERALD_CONFIG`
    /// path > `config/herald.toml` > defaults, with `HERALD__*` env overrides
    /// on top.
    pub fn load() -> HeraldResult<Self> {
        let config_path =
            std::env::var("HERALD_CONFIG").unwrap_or_else(|_| "config/herald".to_string());
        let cfg: Self =
            Self::build(&config_path).map_err(|e| HeraldError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn build(config_path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("guild_id", 0_i64)?
            .set_default("channel_id", 0_i64)?
            .set_default("token", "")?
            .set_default("outputs_dir", "./outputs")?
            .set_default("artifact_ext", "wav")?
            .set_default("api_port", 31335_i64)?
            .set_default("connect_interval_secs", 15_i64)?
            .set_default("connect_attempts", 3_i64)?
            .set_default("connect_timeout_secs", 30_i64)?
            .set_default("connect_retry_delay_secs", 5_i64)?;

        let path = Path::new(config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        builder
            .add_source(config::Environment::with_prefix("HERALD").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Refuse to start on a missing destination or credential.
    pub fn validate(&self) -> HeraldResult<()> {
        if self.guild_id == 0 {
            return Err(HeraldError::Config("guild_id must be non-zero".into()));
        }
        if self.channel_id == 0 {
            return Err(HeraldError::Config("channel_id must be non-zero".into()));
        }
        if self.token.trim().is_empty() {
            return Err(HeraldError::Config("token must be non-empty".into()));
        }
        Ok(())
    }

    /// The single configured voice destination.
    pub fn destination(&self) -> Destination {
        Destination {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
        }
    }

    pub fn connect_interval(&self) -> Duration {
        Duration::from_secs(self.connect_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> HeraldConfig {
        HeraldConfig {
            guild_id: 42,
            channel_id: 7,
            token: "secret".into(),
            outputs_dir: "./outputs".into(),
            artifact_ext: "wav".into(),
            api_port: 31335,
            local_mirror: None,
            listen_sink: None,
            connect_interval_secs: 15,
            connect_attempts: 3,
            connect_timeout_secs: 30,
            connect_retry_delay_secs: 5,
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_zero_guild() {
        let mut cfg = valid();
        cfg.guild_id = 0;
        assert!(matches!(cfg.validate(), Err(HeraldError::Config(_))));
    }

    #[test]
    fn rejects_zero_channel() {
        let mut cfg = valid();
        cfg.channel_id = 0;
        assert!(matches!(cfg.validate(), Err(HeraldError::Config(_))));
    }

    #[test]
    fn rejects_blank_token() {
        let mut cfg = valid();
        cfg.token = "  ".into();
        assert!(matches!(cfg.validate(), Err(HeraldError::Config(_))));
    }
}
