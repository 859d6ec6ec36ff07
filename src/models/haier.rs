//! Haier IR climate models: identifiers, model/variant selectors, typed
//! configuration records and the protocol-level state handed to the IR library.
//!
//! Notes
//! - `HaierAcState` is the input of the external encoder, not a waveform. Bit
//!   layout, checksums and timings stay with the IR library.
//! - Model tokens are resolved through explicit per-variant tables; there is no
//!   fallthrough for unmatched tokens.

use core::fmt;
use serde::{Deserialize, Serialize};

// =====================
// Identifier newtypes
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeripheralId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        PeripheralId(value.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId(value.to_string())
    }
}

// =====================
// Model selector
// =====================

/// Remote model of the AC176 protocol family.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelSelector {
    #[default]
    #[serde(rename = "V9014557_A")]
    V9014557A,
    #[serde(rename = "V9014557_B")]
    V9014557B,
}

impl ModelSelector {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelSelector::V9014557A => "V9014557_A",
            ModelSelector::V9014557B => "V9014557_B",
        }
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const AC176_MODELS: &[(&str, ModelSelector)] = &[
    ("V9014557_A", ModelSelector::V9014557A),
    ("V9014557_B", ModelSelector::V9014557B),
];

const CLIMATE_IR_MODELS: &[(&str, ModelSelector)] = &[("V9014557_A", ModelSelector::V9014557A)];

// =====================
// Packaging variants
// =====================

/// Packaging variant of the component, selected by the `platform` key.
///
/// Each variant declares its own closed model set and its own wiring rules.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// Two-model AC176 package: `model` optional, transmitter implicit.
    #[serde(rename = "haier")]
    Ac176,
    /// Single-model package built on the IR climate base: `model` and
    /// `transmitter_id` both required.
    #[serde(rename = "haier_ir")]
    ClimateIr,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Ac176, Variant::ClimateIr];

    pub fn platform(self) -> &'static str {
        match self {
            Variant::Ac176 => "haier",
            Variant::ClimateIr => "haier_ir",
        }
    }

    pub fn from_platform(name: &str) -> Option<Variant> {
        Variant::ALL.into_iter().find(|v| v.platform() == name)
    }

    pub fn models(self) -> &'static [(&'static str, ModelSelector)] {
        match self {
            Variant::Ac176 => AC176_MODELS,
            Variant::ClimateIr => CLIMATE_IR_MODELS,
        }
    }

    /// Default selector when `model` may be omitted; `None` means required.
    pub fn default_model(self) -> Option<ModelSelector> {
        match self {
            Variant::Ac176 => Some(ModelSelector::V9014557A),
            Variant::ClimateIr => None,
        }
    }

    /// Whether `transmitter_id` is generated from the declared transmitters.
    pub fn transmitter_implicit(self) -> bool {
        matches!(self, Variant::Ac176)
    }

    pub fn resolve_model(self, token: &str) -> Result<ModelSelector, ModelError> {
        self.models()
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, model)| *model)
            .ok_or_else(|| ModelError {
                token: token.to_string(),
                variant: self,
            })
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.platform())
    }
}

/// A model token outside the variant's closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelError {
    pub token: String,
    pub variant: Variant,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accepted = self
            .variant
            .models()
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "unknown model \"{}\" for platform {} (expected one of: {})",
            self.token, self.variant, accepted
        )
    }
}

impl std::error::Error for ModelError {}

// =====================
// Protocol-level state
// =====================

pub const HAIER_MIN_TEMP_C: u8 = 16;
pub const HAIER_MAX_TEMP_C: u8 = 30;
pub const HAIER_DEFAULT_TEMP_C: u8 = 24;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaierCommand {
    On,
    Off,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaierMode {
    Auto,
    Cool,
    Heat,
    Dry,
    Fan,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaierFan {
    Auto,
    Low,
    Medium,
    High,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaierSwingV {
    Off,
    /// Continuous up/down sweep.
    Change,
}

/// Full remote state for one AC176 frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaierAcState {
    pub model: ModelSelector,
    pub command: HaierCommand,
    pub mode: HaierMode,
    pub fan: HaierFan,
    pub swing_v: HaierSwingV,
    pub temp_c: u8,
    pub health: bool,
    pub sleep: bool,
}

impl HaierAcState {
    pub fn new(model: ModelSelector) -> Self {
        HaierAcState {
            model,
            command: HaierCommand::Off,
            mode: HaierMode::Auto,
            fan: HaierFan::Auto,
            swing_v: HaierSwingV::Off,
            temp_c: HAIER_DEFAULT_TEMP_C,
            health: true,
            sleep: false,
        }
    }

    /// Round and clamp into the range the remote can express.
    pub fn set_temp(&mut self, celsius: f32) {
        let rounded = if celsius.is_nan() {
            HAIER_DEFAULT_TEMP_C as f32
        } else {
            celsius.round()
        };
        self.temp_c = rounded.clamp(HAIER_MIN_TEMP_C as f32, HAIER_MAX_TEMP_C as f32) as u8;
    }
}

impl fmt::Display for HaierAcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |b: bool| if b { "On" } else { "Off" };
        write!(
            f,
            "Model: {}, Command: {:?}, Mode: {:?}, Temp: {}C, Fan: {:?}, Swing(V): {:?}, Health: {}, Sleep: {}",
            self.model,
            self.command,
            self.mode,
            self.temp_c,
            self.fan,
            self.swing_v,
            on_off(self.health),
            on_off(self.sleep)
        )
    }
}

// =====================
// Configuration records
// =====================

pub const DEFAULT_SETUP_PRIORITY: f32 = 600.0;
pub const DEFAULT_CARRIER_DUTY_PERCENT: u8 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualConfig {
    #[serde(default)]
    pub min_temperature: Option<f32>,
    #[serde(default)]
    pub max_temperature: Option<f32>,
    #[serde(default)]
    pub temperature_step: Option<f32>,
}

/// A validated climate entry. Produced only by `schema::validate_entry`, so
/// defaults and generated identifiers are already filled in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClimateEntityConfig {
    pub platform: Variant,
    pub id: EntityId,
    pub name: String,
    pub model: ModelSelector,
    pub transmitter_id: PeripheralId,
    #[serde(default)]
    pub receiver_id: Option<PeripheralId>,
    #[serde(default)]
    pub visual: Option<VisualConfig>,
    pub setup_priority: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransmitterConfig {
    pub id: PeripheralId,
    pub pin: u8,
    #[serde(default = "default_carrier_duty")]
    pub carrier_duty_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReceiverConfig {
    pub id: PeripheralId,
    pub pin: u8,
}

fn default_carrier_duty() -> u8 {
    DEFAULT_CARRIER_DUTY_PERCENT
}

/// Whole configuration document. Climate entries stay raw until each one is
/// validated against its variant's schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    #[serde(default)]
    pub remote_transmitter: Vec<TransmitterConfig>,
    #[serde(default)]
    pub remote_receiver: Vec<ReceiverConfig>,
    #[serde(default)]
    pub climate: Vec<serde_json::Value>,
}
