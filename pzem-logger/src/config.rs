//! YAML configuration of the bridge.
//!
//! ```yaml
//! serial:
//!   device: /dev/ttyUSB0
//! devices:
//!   - address: 10
//!     role: grid
//!   - address: 11
//!     role: inverter
//!     position: ac-input-1
//!   - address: 30
//!     role: dc-meter
//! logger:
//!   datadir: /data/tealog
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decode::{Variant, GENERAL_ADDRESS};
use crate::error::ConfigError;
use crate::logger_service::SourceSpec;
use crate::polling::POLL_INTERVAL;
use crate::publisher::{DeviceRole, Position, DISCONNECT_AFTER};
use crate::transport::SerialConfig;

/// Role names as written in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleName {
    Grid,
    Inverter,
    #[serde(rename = "pzem-016")]
    Pzem016,
    DcMeter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: u8,
    pub role: RoleName,
    /// Inverters only.
    #[serde(default)]
    pub position: Position,
    /// Defaults to the variant the role needs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
}

impl DeviceConfig {
    pub fn role(&self) -> DeviceRole {
        match self.role {
            RoleName::Grid => DeviceRole::Grid,
            RoleName::Inverter => DeviceRole::PvInverter {
                position: self.position,
            },
            RoleName::Pzem016 => DeviceRole::Pzem016,
            RoleName::DcMeter => DeviceRole::DcMeter,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant.unwrap_or_else(|| self.role().variant())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub enabled: bool,
    pub datadir: PathBuf,
    pub sources: Vec<SourceSpec>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            datadir: PathBuf::from("/data/tealog"),
            sources: vec![SourceSpec::battery()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub poll_interval_ms: u64,
    pub disconnect_after: u32,
    pub devices: Vec<DeviceConfig>,
    pub logger: LoggerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
            disconnect_after: DISCONNECT_AFTER,
            devices: vec![DeviceConfig {
                address: 20,
                role: RoleName::Pzem016,
                position: Position::default(),
                variant: None,
            }],
            logger: LoggerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }

        let mut addresses = HashSet::new();
        for device in &self.devices {
            if device.address == GENERAL_ADDRESS {
                if self.devices.len() > 1 {
                    return Err(ConfigError::Invalid(format!(
                        "device address {GENERAL_ADDRESS:#04x} reaches every meter on the line, \
                         it is only allowed when a single device is configured"
                    )));
                }
            } else if !(1..=247).contains(&device.address) {
                return Err(ConfigError::Invalid(format!(
                    "device address {} is outside 1..=247",
                    device.address
                )));
            }
            if !addresses.insert(device.address) {
                return Err(ConfigError::Invalid(format!(
                    "device address {} is configured twice",
                    device.address
                )));
            }
            let role = device.role();
            if device.variant() != role.variant() {
                return Err(ConfigError::Invalid(format!(
                    "device {} is a {} meter but {role} needs a {} meter",
                    device.address,
                    device.variant(),
                    role.variant()
                )));
            }
        }

        if let Some(source) = self.logger.sources.iter().find(|s| s.metrics.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "logger source {} has no metrics",
                source.prefix
            )));
        }
        Ok(())
    }

    /// Override file settings with the ones given on the command line.
    pub fn apply_args(&mut self, device: Option<String>, datadir: Option<PathBuf>) {
        if let Some(device) = device {
            log::debug!("overriding serial device from command line: {device}");
            self.serial.device = device;
        }
        if let Some(datadir) = datadir {
            log::debug!(
                "overriding data directory from command line: {}",
                datadir.display()
            );
            self.logger.datadir = datadir;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Name of the serial device without its directory, as used in service names.
    pub fn device_name(&self) -> String {
        Path::new(&self.serial.device)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.serial.device.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Metric, MetricType};

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.timeout(), Duration::from_millis(100));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.disconnect_after, 60);
        assert_eq!(config.device_name(), "ttyUSB0");
    }

    #[test]
    fn test_parse_devices_and_logger() {
        let config = Config::from_yaml(
            r#"
serial:
  device: /dev/ttyS1
  stop_bits: 1
devices:
  - address: 10
    role: grid
  - address: 11
    role: inverter
    position: ac-input-1
  - address: 30
    role: dc-meter
logger:
  datadir: /tmp/tea
  sources:
    - prefix: com.victronenergy.battery
      metrics:
        - path: /History/ChargedEnergy
          type: d
        - path: /Soc
"#,
        )
        .unwrap();

        assert_eq!(config.serial.device, "/dev/ttyS1");
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.devices[0].role(), DeviceRole::Grid);
        assert_eq!(
            config.devices[1].role(),
            DeviceRole::PvInverter {
                position: Position::AcInput1
            }
        );
        assert_eq!(config.devices[2].variant(), Variant::Dc);
        assert!(config.logger.enabled);
        assert_eq!(
            config.logger.sources[0].metrics,
            vec![
                Metric::new("/History/ChargedEnergy", MetricType::Double),
                Metric::float("/Soc"),
            ]
        );
    }

    #[test]
    fn test_validate_rejects() {
        let duplicate = "devices: [{address: 10, role: grid}, {address: 10, role: pzem-016}]";
        assert!(matches!(
            Config::from_yaml(duplicate),
            Err(ConfigError::Invalid(_))
        ));

        let wrong_variant = "devices: [{address: 10, role: grid, variant: dc}]";
        assert!(matches!(
            Config::from_yaml(wrong_variant),
            Err(ConfigError::Invalid(_))
        ));

        let broadcast = "devices: [{address: 0, role: grid}]";
        assert!(matches!(
            Config::from_yaml(broadcast),
            Err(ConfigError::Invalid(_))
        ));

        let general_on_shared_line = "devices: [{address: 248, role: grid}, {address: 10, role: pzem-016}]";
        assert!(matches!(
            Config::from_yaml(general_on_shared_line),
            Err(ConfigError::Invalid(msg)) if msg.contains("single device")
        ));

        assert!(matches!(
            Config::from_yaml("devices: [{address: 10, role: toaster}]"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_general_address_for_single_device() {
        let config = Config::from_yaml("devices: [{address: 248, role: dc-meter}]").unwrap();
        assert_eq!(config.devices[0].address, GENERAL_ADDRESS);
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(Some("/dev/ttyAMA0".to_string()), None);
        assert_eq!(config.serial.device, "/dev/ttyAMA0");
        assert_eq!(config.logger.datadir, PathBuf::from("/data/tealog"));

        config.apply_args(None, Some(PathBuf::from("/tmp/tea")));
        assert_eq!(config.logger.datadir, PathBuf::from("/tmp/tea"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pzem.yaml");
        std::fs::write(&path, "poll_interval_ms: 2000\n").unwrap();

        assert_eq!(
            Config::from_file(&path).unwrap().poll_interval(),
            Duration::from_secs(2)
        );
        assert!(matches!(
            Config::from_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
