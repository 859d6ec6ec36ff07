//! Climate-facing types shared by every climate entity: operating modes,
//! traits advertised to control surfaces, current state and control calls.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClimateMode {
    Off,
    HeatCool,
    Cool,
    Heat,
    FanOnly,
    Dry,
    Auto,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanMode {
    On,
    Off,
    Auto,
    Low,
    Medium,
    High,
    Middle,
    Focus,
    Diffuse,
    Quiet,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingMode {
    Off,
    Both,
    Vertical,
    Horizontal,
}

/// What a climate entity supports, as advertised to UIs and remote APIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateTraits {
    pub supported_modes: Vec<ClimateMode>,
    pub supported_fan_modes: Vec<FanMode>,
    pub supported_swing_modes: Vec<SwingMode>,
    pub visual_min_temperature: f32,
    pub visual_max_temperature: f32,
    pub visual_temperature_step: f32,
}

impl ClimateTraits {
    pub fn supports_mode(&self, mode: ClimateMode) -> bool {
        self.supported_modes.contains(&mode)
    }

    pub fn supports_fan_mode(&self, fan: FanMode) -> bool {
        self.supported_fan_modes.contains(&fan)
    }

    pub fn supports_swing_mode(&self, swing: SwingMode) -> bool {
        self.supported_swing_modes.contains(&swing)
    }

    pub fn add_supported_swing_mode(&mut self, swing: SwingMode) {
        if !self.supports_swing_mode(swing) {
            self.supported_swing_modes.push(swing);
        }
    }

    /// Clamp a requested target into the visual range.
    pub fn clamp_temperature(&self, celsius: f32) -> f32 {
        celsius.clamp(self.visual_min_temperature, self.visual_max_temperature)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct ClimateState {
    pub mode: ClimateMode,
    pub target_temperature: f32,
    pub fan_mode: Option<FanMode>,
    pub swing_mode: SwingMode,
}

/// A control request. Unset fields leave the current value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateCall {
    pub mode: Option<ClimateMode>,
    pub target_temperature: Option<f32>,
    pub fan_mode: Option<FanMode>,
    pub swing_mode: Option<SwingMode>,
}

impl ClimateCall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ClimateMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_target_temperature(mut self, celsius: f32) -> Self {
        self.target_temperature = Some(celsius);
        self
    }

    pub fn with_fan_mode(mut self, fan: FanMode) -> Self {
        self.fan_mode = Some(fan);
        self
    }

    pub fn with_swing_mode(mut self, swing: SwingMode) -> Self {
        self.swing_mode = Some(swing);
        self
    }
}
