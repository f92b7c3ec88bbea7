//! Pulsar configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{PulsarError, Result};

/// Main Pulsar configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulsarConfig {
    /// Input connector, `name[:address]` (listens)
    pub input: String,

    /// Output connector, `name[:address]` (dials)
    pub output: String,

    /// Handler chain, `name[:options]` entries applied in order
    pub handlers: Vec<String>,

    /// Directions whose connector passes bytes through unfragmented
    pub plain: Vec<Direction>,

    /// Decode data read from the input instead of encoding it
    pub decode: bool,

    /// Also relay from output back to input
    pub duplex: bool,

    /// Pause between loop iterations
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Print connector statistics on exit
    pub verbose: bool,
}

impl Default for PulsarConfig {
    fn default() -> Self {
        Self {
            input: "console".to_string(),
            output: "console".to_string(),
            handlers: Vec::new(),
            plain: Vec::new(),
            decode: false,
            duplex: false,
            delay: Duration::ZERO,
            verbose: false,
        }
    }
}

/// Side of the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl FromStr for Direction {
    type Err = PulsarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            other => Err(PulsarError::InvalidConfig(format!(
                "{} is an invalid direction, you must use only 'in'/'out'",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

impl PulsarConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn is_plain(&self, direction: Direction) -> bool {
        self.plain.contains(&direction)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.input.is_empty() || self.output.is_empty() {
            return Err(PulsarError::InvalidConfig(
                "input and output connectors must be set".to_string(),
            ));
        }

        if let Some(spec) = self.handlers.iter().find(|spec| {
            let (name, _) = crate::handle::split_handler_options(spec);
            name.is_empty()
        }) {
            return Err(PulsarError::InvalidConfig(format!(
                "handler entry '{}' has no name",
                spec
            )));
        }

        if self.plain.len() > 2 || (self.plain.len() == 2 && self.plain[0] == self.plain[1]) {
            return Err(PulsarError::InvalidConfig(
                "plain lists a direction more than once".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PulsarConfig::default();
        assert_eq!(config.input, "console");
        assert_eq!(config.output, "console");
        assert!(config.handlers.is_empty());
        assert_eq!(config.delay, Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("out".parse::<Direction>().unwrap(), Direction::Out);
        let err = "up".parse::<Direction>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: up is an invalid direction, you must use only 'in'/'out'"
        );
    }

    #[test]
    fn test_toml_parsing() {
        let config: PulsarConfig = toml::from_str(
            r#"
            input = "udp:0.0.0.0:9000"
            output = "dns:t.example.com@10.0.0.1:53"
            handlers = ["base64", "cipher:chacha#secret"]
            plain = ["in"]
            duplex = true
            delay = "15ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.output, "dns:t.example.com@10.0.0.1:53");
        assert_eq!(config.handlers.len(), 2);
        assert!(config.is_plain(Direction::In));
        assert!(!config.is_plain(Direction::Out));
        assert!(config.duplex);
        assert!(!config.decode);
        assert_eq!(config.delay, Duration::from_millis(15));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PulsarConfig::default();

        config.output.clear();
        assert!(config.validate().is_err());

        config.output = "tcp:127.0.0.1:4000".to_string();
        config.handlers = vec![":opts".to_string()];
        assert!(config.validate().is_err());

        config.handlers = vec!["stub".to_string()];
        config.plain = vec![Direction::Out, Direction::Out];
        assert!(config.validate().is_err());

        config.plain = vec![Direction::Out, Direction::In];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("pulsar-config-{}.toml", std::process::id()));
        let config = PulsarConfig {
            handlers: vec!["base32".to_string()],
            delay: Duration::from_millis(250),
            verbose: true,
            ..Default::default()
        };

        config.to_file(&path).unwrap();
        let loaded = PulsarConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }
}
