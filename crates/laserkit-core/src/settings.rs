//! Typed settings registry
//!
//! Named settings with a declared type, backed by live accessor closures
//! so values always reflect the owning configuration. Front ends read
//! and write settings by name and get type-checked parsing for free.

use crate::command::SignalValue;
use crate::error::SettingsError;
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a registered setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Text
    Str,
    /// Boolean
    Bool,
}

impl SettingKind {
    /// Type name for error messages
    pub fn name(&self) -> &'static str {
        match self {
            SettingKind::Int => "int",
            SettingKind::Float => "float",
            SettingKind::Str => "str",
            SettingKind::Bool => "bool",
        }
    }

    /// Parse raw text as a value of this kind
    pub fn parse(&self, name: &str, raw: &str) -> Result<SignalValue, SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidValue {
            name: name.to_string(),
            reason,
        };
        match self {
            SettingKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(SignalValue::Int)
                .map_err(|_| invalid(format!("{:?} is not an int", raw))),
            SettingKind::Float => raw
                .trim()
                .parse::<f64>()
                .map(SignalValue::Float)
                .map_err(|_| invalid(format!("{:?} is not a float", raw))),
            SettingKind::Str => Ok(SignalValue::Str(raw.to_string())),
            SettingKind::Bool => match raw.trim() {
                "true" | "1" => Ok(SignalValue::Bool(true)),
                "false" | "0" => Ok(SignalValue::Bool(false)),
                _ => Err(invalid(format!("{:?} is not a bool", raw))),
            },
        }
    }

    fn matches(&self, value: &SignalValue) -> bool {
        matches!(
            (self, value),
            (SettingKind::Int, SignalValue::Int(_))
                | (SettingKind::Float, SignalValue::Float(_))
                | (SettingKind::Str, SignalValue::Str(_))
                | (SettingKind::Bool, SignalValue::Bool(_))
        )
    }
}

type Getter = Box<dyn Fn() -> SignalValue + Send + Sync>;
type Setter = Box<dyn Fn(SignalValue) -> Result<(), SettingsError> + Send + Sync>;

struct SettingSlot {
    kind: SettingKind,
    getter: Getter,
    setter: Setter,
}

/// Registry of named, typed settings
#[derive(Default)]
pub struct SettingsRegistry {
    slots: BTreeMap<String, SettingSlot>,
}

impl SettingsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a setting under `name` with live accessors
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: SettingKind,
        getter: impl Fn() -> SignalValue + Send + Sync + 'static,
        setter: impl Fn(SignalValue) -> Result<(), SettingsError> + Send + Sync + 'static,
    ) {
        self.slots.insert(
            name.into(),
            SettingSlot {
                kind,
                getter: Box::new(getter),
                setter: Box::new(setter),
            },
        );
    }

    /// Read the current value of a setting
    pub fn get(&self, name: &str) -> Result<SignalValue, SettingsError> {
        let slot = self.lookup(name)?;
        Ok((slot.getter)())
    }

    /// Write a typed value, rejecting kind mismatches
    ///
    /// Int values are accepted for Float settings; every other mismatch
    /// is an error.
    pub fn set(&self, name: &str, value: SignalValue) -> Result<(), SettingsError> {
        let slot = self.lookup(name)?;
        let value = match (slot.kind, value) {
            (SettingKind::Float, SignalValue::Int(v)) => SignalValue::Float(v as f64),
            (_, value) => value,
        };
        if !slot.kind.matches(&value) {
            return Err(SettingsError::InvalidValue {
                name: name.to_string(),
                reason: format!("expected {}, got {}", slot.kind.name(), value),
            });
        }
        (slot.setter)(value)
    }

    /// Parse raw text by the declared kind, then write it
    pub fn set_from_str(&self, name: &str, raw: &str) -> Result<SignalValue, SettingsError> {
        let slot = self.lookup(name)?;
        let value = slot.kind.parse(name, raw)?;
        (slot.setter)(value.clone())?;
        Ok(value)
    }

    /// Declared kind of a setting, if registered
    pub fn kind(&self, name: &str) -> Option<SettingKind> {
        self.slots.get(name).map(|slot| slot.kind)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Number of registered settings
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Dump all settings and current values as a JSON object
    pub fn dump(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, slot) in &self.slots {
            let value = match (slot.getter)() {
                SignalValue::Int(v) => serde_json::json!(v),
                SignalValue::Float(v) => serde_json::json!(v),
                SignalValue::Str(v) => serde_json::json!(v),
                SignalValue::Bool(v) => serde_json::json!(v),
            };
            map.insert(name.clone(), value);
        }
        serde_json::Value::Object(map)
    }

    fn lookup(&self, name: &str) -> Result<&SettingSlot, SettingsError> {
        self.slots
            .get(name)
            .ok_or_else(|| SettingsError::UnknownSetting {
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for SettingsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsRegistry")
            .field("names", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}
