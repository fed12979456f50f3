use crate::chord::types::IdSpace;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for one ring member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    /// Identifier width in bytes; the ring has 2^(8 * key_size) positions.
    pub key_size: u32,
    pub addr: String,
    /// 0 picks a free port.
    pub port: u16,

    /// Bound on every remote call, in ms.
    pub timeout_ms: u64,

    pub stabilize_interval_ms: u64,
    pub fix_finger_interval_ms: u64,
    pub check_predecessor_interval_ms: u64,

    pub successor_list_size: usize,

    pub logging: bool,

    pub tcp_nodelay: bool,
    pub tcp_keepalive_secs: u64,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            key_size: 8,
            addr: "127.0.0.1".to_string(),
            port: 0,
            timeout_ms: 5000,
            stabilize_interval_ms: 250,
            fix_finger_interval_ms: 50,
            check_predecessor_interval_ms: 150,
            successor_list_size: 2,
            logging: true,
            tcp_nodelay: true,
            tcp_keepalive_secs: 60,
        }
    }
}

impl ChordConfig {
    pub fn for_address(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            ..Self::default()
        }
    }

    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ChordConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.key_size) {
            return Err(ConfigError::Invalid(format!(
                "key_size must be between 1 and 8 bytes, got {}",
                self.key_size
            )));
        }
        if self.successor_list_size == 0 {
            return Err(ConfigError::Invalid(
                "successor_list_size must be at least 1".into(),
            ));
        }
        let intervals = [
            ("timeout_ms", self.timeout_ms),
            ("stabilize_interval_ms", self.stabilize_interval_ms),
            ("fix_finger_interval_ms", self.fix_finger_interval_ms),
            ("check_predecessor_interval_ms", self.check_predecessor_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn id_space(&self) -> Result<IdSpace, ConfigError> {
        IdSpace::new(self.key_size * 8)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_millis(self.stabilize_interval_ms)
    }

    pub fn fix_finger_interval(&self) -> Duration {
        Duration::from_millis(self.fix_finger_interval_ms)
    }

    pub fn check_predecessor_interval(&self) -> Duration {
        Duration::from_millis(self.check_predecessor_interval_ms)
    }

    pub fn tcp_keepalive(&self) -> Option<Duration> {
        (self.tcp_keepalive_secs > 0).then(|| Duration::from_secs(self.tcp_keepalive_secs))
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tunables() {
        let config = ChordConfig::default();
        assert_eq!(config.key_size, 8);
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.stabilize_interval(), Duration::from_millis(250));
        assert_eq!(config.fix_finger_interval(), Duration::from_millis(50));
        assert_eq!(config.check_predecessor_interval(), Duration::from_millis(150));
        assert_eq!(config.successor_list_size, 2);
        assert!(config.logging);
        assert_eq!(config.id_space().unwrap().bits(), 64);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ChordConfig =
            serde_json::from_str(r#"{"port": 7000, "successor_list_size": 4}"#).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.successor_list_size, 4);
        assert_eq!(config.stabilize_interval_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = ChordConfig::default();
        config.key_size = 9;
        assert!(config.validate().is_err());

        let mut config = ChordConfig::default();
        config.successor_list_size = 0;
        assert!(config.validate().is_err());

        let mut config = ChordConfig::default();
        config.fix_finger_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
