//! Device configuration
//!
//! One file (TOML or JSON) holding everything needed to bring the
//! pipeline up: transport parameters, board behavior, bed geometry,
//! spooler limits, and the GRBL listen address. Stored in the platform
//! config directory by default.
//!
//! `build_registry` exposes the live configuration through the typed
//! settings registry so front ends can read and write values by name.

use laserkit_core::command::SignalValue;
use laserkit_core::data::BedSize;
use laserkit_core::error::{Error, Result, SettingsError};
use laserkit_core::settings::{SettingKind, SettingsRegistry};
use laserkit_device::{InterpreterConfig, SerialConfig, SpoolerConfig};
use laserkit_grbl::GrblConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Board flavors the LHYMICRO-GL dialect covers
pub const BOARD_NAMES: [&str; 6] = ["M", "M1", "M2", "B", "B1", "B2"];

/// Persisted device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserkitConfig {
    /// Serial port device path; `None` means no port configured yet
    pub port: Option<String>,
    /// Baud rate for the serial channel
    pub baud_rate: u32,
    /// Board flavor, one of `BOARD_NAMES`
    pub board: String,
    /// Keep the rails locked after default-mode moves
    pub autolock: bool,
    /// Bed width (X travel) in millimetres
    pub bed_width_mm: f64,
    /// Bed height (Y travel) in millimetres
    pub bed_height_mm: f64,
    /// Rapid offset applied after every homing cycle, X in mils
    pub home_adjust_x: f64,
    /// Rapid offset applied after every homing cycle, Y in mils
    pub home_adjust_y: f64,
    /// Mirror the X axis for GRBL producers
    pub flip_x: bool,
    /// Mirror the Y axis for GRBL producers
    pub flip_y: bool,
    /// Outstanding-byte ceiling for the spooler buffer gate
    pub buffer_max: Option<usize>,
    /// Dispatch rejections tolerated before the pipeline closes
    pub max_rejections: u64,
    /// GRBL server listen address
    pub listen: String,
}

impl Default for LaserkitConfig {
    fn default() -> Self {
        LaserkitConfig {
            port: None,
            baud_rate: 115_200,
            board: "M2".to_string(),
            autolock: true,
            bed_width_mm: 310.0,
            bed_height_mm: 210.0,
            home_adjust_x: 0.0,
            home_adjust_y: 0.0,
            flip_x: false,
            flip_y: false,
            buffer_max: Some(900),
            max_rejections: 8,
            listen: "0.0.0.0:23".to_string(),
        }
    }
}

impl LaserkitConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid JSON config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?
        } else {
            return Err(Error::other(
                "Config file must be .json or .toml".to_string(),
            ));
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else {
            return Err(Error::other(
                "Config file must be .json or .toml".to_string(),
            ));
        };

        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::other("Baud rate must be > 0".to_string()));
        }

        if !BOARD_NAMES.contains(&self.board.as_str()) {
            return Err(Error::other(format!(
                "Unknown board {:?}, expected one of {}",
                self.board,
                BOARD_NAMES.join(", ")
            )));
        }

        if self.bed_width_mm <= 0.0 || self.bed_height_mm <= 0.0 {
            return Err(Error::other("Bed dimensions must be > 0".to_string()));
        }

        if self.max_rejections == 0 {
            return Err(Error::other("Rejection threshold must be > 0".to_string()));
        }

        if self.listen.is_empty() {
            return Err(Error::other("Listen address must not be empty".to_string()));
        }

        Ok(())
    }

    /// Default config file location in the platform config directory
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("laserkit");

        std::fs::create_dir_all(&config_dir).ok();
        config_dir.join("config.toml")
    }

    /// Bed travel in mils
    pub fn bed_size(&self) -> BedSize {
        BedSize::from_mm(self.bed_width_mm, self.bed_height_mm)
    }

    /// Interpreter parameters drawn from this config
    pub fn interpreter_config(&self) -> InterpreterConfig {
        InterpreterConfig {
            autolock: self.autolock,
            ..InterpreterConfig::default()
        }
    }

    /// Spooler parameters drawn from this config
    pub fn spooler_config(&self) -> SpoolerConfig {
        SpoolerConfig {
            buffer_max: self.buffer_max,
            max_rejections: self.max_rejections,
            ..SpoolerConfig::default()
        }
    }

    /// GRBL session parameters drawn from this config
    pub fn grbl_config(&self) -> GrblConfig {
        let home_adjust = if self.home_adjust_x != 0.0 || self.home_adjust_y != 0.0 {
            Some((self.home_adjust_x, self.home_adjust_y))
        } else {
            None
        };
        GrblConfig {
            flip_x: if self.flip_x { -1.0 } else { 1.0 },
            flip_y: if self.flip_y { -1.0 } else { 1.0 },
            home_adjust,
        }
    }

    /// Serial channel parameters, if a port is configured
    pub fn serial_config(&self) -> Option<SerialConfig> {
        self.port.as_ref().map(|port| SerialConfig {
            port: port.clone(),
            baud_rate: self.baud_rate,
            ..SerialConfig::default()
        })
    }
}

fn register_float(
    registry: &mut SettingsRegistry,
    shared: &Arc<RwLock<LaserkitConfig>>,
    name: &'static str,
    get: fn(&LaserkitConfig) -> f64,
    set: fn(&mut LaserkitConfig, f64),
) {
    let read = shared.clone();
    let write = shared.clone();
    registry.register(
        name,
        SettingKind::Float,
        move || SignalValue::Float(get(&read.read())),
        move |value| {
            if let SignalValue::Float(v) = value {
                set(&mut write.write(), v);
            }
            Ok(())
        },
    );
}

fn register_bool(
    registry: &mut SettingsRegistry,
    shared: &Arc<RwLock<LaserkitConfig>>,
    name: &'static str,
    get: fn(&LaserkitConfig) -> bool,
    set: fn(&mut LaserkitConfig, bool),
) {
    let read = shared.clone();
    let write = shared.clone();
    registry.register(
        name,
        SettingKind::Bool,
        move || SignalValue::Bool(get(&read.read())),
        move |value| {
            if let SignalValue::Bool(v) = value {
                set(&mut write.write(), v);
            }
            Ok(())
        },
    );
}

/// Register every configuration field in a settings registry
///
/// Accessors go through the shared handle, so reads always see the
/// current value and writes land in the live configuration.
pub fn build_registry(shared: Arc<RwLock<LaserkitConfig>>) -> SettingsRegistry {
    let mut registry = SettingsRegistry::new();

    register_float(
        &mut registry,
        &shared,
        "bed_width_mm",
        |c| c.bed_width_mm,
        |c, v| c.bed_width_mm = v,
    );
    register_float(
        &mut registry,
        &shared,
        "bed_height_mm",
        |c| c.bed_height_mm,
        |c, v| c.bed_height_mm = v,
    );
    register_float(
        &mut registry,
        &shared,
        "home_adjust_x",
        |c| c.home_adjust_x,
        |c, v| c.home_adjust_x = v,
    );
    register_float(
        &mut registry,
        &shared,
        "home_adjust_y",
        |c| c.home_adjust_y,
        |c, v| c.home_adjust_y = v,
    );
    register_bool(
        &mut registry,
        &shared,
        "autolock",
        |c| c.autolock,
        |c, v| c.autolock = v,
    );
    register_bool(
        &mut registry,
        &shared,
        "flip_x",
        |c| c.flip_x,
        |c, v| c.flip_x = v,
    );
    register_bool(
        &mut registry,
        &shared,
        "flip_y",
        |c| c.flip_y,
        |c, v| c.flip_y = v,
    );

    let read = shared.clone();
    let write = shared.clone();
    registry.register(
        "port",
        SettingKind::Str,
        move || SignalValue::Str(read.read().port.clone().unwrap_or_default()),
        move |value| {
            if let SignalValue::Str(v) = value {
                write.write().port = if v.is_empty() { None } else { Some(v) };
            }
            Ok(())
        },
    );

    let read = shared.clone();
    let write = shared.clone();
    registry.register(
        "baud_rate",
        SettingKind::Int,
        move || SignalValue::Int(read.read().baud_rate as i64),
        move |value| {
            if let SignalValue::Int(v) = value {
                if v <= 0 {
                    return Err(SettingsError::InvalidValue {
                        name: "baud_rate".to_string(),
                        reason: "must be > 0".to_string(),
                    });
                }
                write.write().baud_rate = v as u32;
            }
            Ok(())
        },
    );

    let read = shared.clone();
    let write = shared.clone();
    registry.register(
        "board",
        SettingKind::Str,
        move || SignalValue::Str(read.read().board.clone()),
        move |value| {
            if let SignalValue::Str(v) = value {
                if !BOARD_NAMES.contains(&v.as_str()) {
                    return Err(SettingsError::InvalidValue {
                        name: "board".to_string(),
                        reason: format!("unknown board {:?}", v),
                    });
                }
                write.write().board = v;
            }
            Ok(())
        },
    );

    // 0 or below disables the buffer gate.
    let read = shared.clone();
    let write = shared.clone();
    registry.register(
        "buffer_max",
        SettingKind::Int,
        move || SignalValue::Int(read.read().buffer_max.map_or(0, |v| v as i64)),
        move |value| {
            if let SignalValue::Int(v) = value {
                write.write().buffer_max = if v > 0 { Some(v as usize) } else { None };
            }
            Ok(())
        },
    );

    let read = shared.clone();
    let write = shared;
    registry.register(
        "max_rejections",
        SettingKind::Int,
        move || SignalValue::Int(read.read().max_rejections as i64),
        move |value| {
            if let SignalValue::Int(v) = value {
                if v <= 0 {
                    return Err(SettingsError::InvalidValue {
                        name: "max_rejections".to_string(),
                        reason: "must be > 0".to_string(),
                    });
                }
                write.write().max_rejections = v as u64;
            }
            Ok(())
        },
    );

    registry
}
