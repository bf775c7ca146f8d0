use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::detect::PipelineSettings;
use crate::gate::{DEFAULT_GATE_ADDR, DEFAULT_MAX_ATTEMPTS};
use crate::output::{SerialSettings, DEFAULT_BAUD_RATE};

const DEFAULT_GATE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    gate: Option<GateConfigFile>,
    serial: Option<SerialConfigFile>,
    output: Option<OutputConfigFile>,
    detection: Option<DetectionConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct GateConfigFile {
    enabled: Option<bool>,
    addr: Option<String>,
    max_attempts: Option<u32>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    device: Option<String>,
    baud_rate: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    binarize_threshold: Option<u8>,
    min_blob_width: Option<u32>,
    min_blob_height: Option<u32>,
    unwarp_size: Option<u32>,
    min_confidence: Option<f32>,
    stable_window: Option<usize>,
    cooldown_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub gate: GateSettings,
    pub serial: SerialSettings,
    pub output_enabled: bool,
    pub detection: PipelineSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone)]
pub struct GateSettings {
    /// When false the start flag is opened at startup.
    pub enabled: bool,
    pub addr: String,
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl GateSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.addr
            .parse()
            .map_err(|_| anyhow!("gate address '{}' is not a socket address", self.addr))
    }
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl RelayConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GLYPH_RELAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Self {
        let gate_file = file.gate.unwrap_or_default();
        let gate = GateSettings {
            enabled: gate_file.enabled.unwrap_or(true),
            addr: gate_file
                .addr
                .unwrap_or_else(|| DEFAULT_GATE_ADDR.to_string()),
            max_attempts: gate_file.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            connect_timeout: Duration::from_millis(
                gate_file
                    .connect_timeout_ms
                    .unwrap_or(DEFAULT_GATE_TIMEOUT_MS),
            ),
        };

        let serial_file = file.serial.unwrap_or_default();
        let serial = SerialSettings {
            device: serial_file
                .device
                .unwrap_or_else(|| DEFAULT_SERIAL_DEVICE.to_string()),
            baud_rate: serial_file.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            ..SerialSettings::default()
        };

        let defaults = PipelineSettings::default();
        let detection_file = file.detection.unwrap_or_default();
        let detection = PipelineSettings {
            binarize_threshold: detection_file
                .binarize_threshold
                .unwrap_or(defaults.binarize_threshold),
            min_blob_width: detection_file
                .min_blob_width
                .unwrap_or(defaults.min_blob_width),
            min_blob_height: detection_file
                .min_blob_height
                .unwrap_or(defaults.min_blob_height),
            unwarp_size: detection_file.unwarp_size.unwrap_or(defaults.unwarp_size),
            min_confidence: detection_file
                .min_confidence
                .unwrap_or(defaults.min_confidence),
            stable_window: detection_file
                .stable_window
                .unwrap_or(defaults.stable_window),
            cooldown: detection_file
                .cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cooldown),
        };

        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            width: source_file.width.unwrap_or(DEFAULT_FRAME_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
        };

        Self {
            gate,
            serial,
            output_enabled: file.output.and_then(|o| o.enabled).unwrap_or(false),
            detection,
            source,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(enabled) = std::env::var("GLYPH_RELAY_GATE_ENABLED") {
            self.gate.enabled = parse_bool("GLYPH_RELAY_GATE_ENABLED", &enabled)?;
        }
        if let Ok(addr) = std::env::var("GLYPH_RELAY_GATE_ADDR") {
            if !addr.trim().is_empty() {
                self.gate.addr = addr.trim().to_string();
            }
        }
        if let Ok(device) = std::env::var("GLYPH_RELAY_SERIAL_DEVICE") {
            if !device.trim().is_empty() {
                self.serial.device = device.trim().to_string();
            }
        }
        if let Ok(enabled) = std::env::var("GLYPH_RELAY_OUTPUT_ENABLED") {
            self.output_enabled = parse_bool("GLYPH_RELAY_OUTPUT_ENABLED", &enabled)?;
        }
        if let Ok(fps) = std::env::var("GLYPH_RELAY_FPS") {
            self.source.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("GLYPH_RELAY_FPS must be an integer frame rate"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.gate.max_attempts == 0 {
            return Err(anyhow!("gate.max_attempts must be greater than zero"));
        }
        self.gate.socket_addr()?;
        if self.source.target_fps == 0 {
            return Err(anyhow!("source.target_fps must be greater than zero"));
        }
        let confidence = self.detection.min_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "detection.min_confidence must be within [0, 1], got {}",
                confidence
            ));
        }
        if self.detection.stable_window == 0 {
            return Err(anyhow!("detection.stable_window must be at least 1"));
        }
        if self.detection.cooldown.is_zero() {
            return Err(anyhow!("detection.cooldown_ms must be greater than zero"));
        }
        if self.serial.device.trim().is_empty() {
            return Err(anyhow!("serial.device must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean, got '{}'", key, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_rig() {
        let cfg = RelayConfig::from_file(RelayConfigFile::default());
        assert!(cfg.gate.enabled);
        assert_eq!(cfg.gate.addr, "169.254.0.100:80");
        assert_eq!(cfg.gate.max_attempts, 10);
        assert_eq!(cfg.serial.baud_rate, 9600);
        assert!(!cfg.output_enabled);
        assert_eq!(cfg.detection, PipelineSettings::default());
        assert_eq!(cfg.source.target_fps, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("K", "TRUE").unwrap());
        assert!(!parse_bool("K", " off ").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.detection.min_confidence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.detection.stable_window = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.gate.addr = "controller".to_string();
        assert!(cfg.validate().is_err());
    }
}
