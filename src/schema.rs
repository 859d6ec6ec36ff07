//! Option tables for climate entries.
//!
//! Each variant's schema is composed from base tables (`climate`, `visual`,
//! `ir`, `component`) plus its own `model`/`transmitter_id` rules. Composition
//! is an explicit merge: a later table replaces a key declared by an earlier one.
//!
//! Validation rejects unknown keys, enforces required ones, applies defaults,
//! fills generated identifiers and then hands the record to serde for the
//! typed `ClimateEntityConfig`.

use crate::models::haier::{
    ClimateEntityConfig, DEFAULT_SETUP_PRIORITY, HAIER_MAX_TEMP_C, HAIER_MIN_TEMP_C, ModelError, PeripheralId,
    Variant, VisualConfig,
};
use crate::utils::is_valid_identifier;
use core::fmt;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    Required,
    Optional,
    Default(Value),
    /// Auto-generated identifier `<prefix>_<n>` when omitted.
    GenerateId(&'static str),
    /// Resolves to the one declared transmitter when omitted.
    SoleTransmitter,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OptionKind {
    /// Declares a new identifier.
    Identifier,
    /// Refers to an identifier declared elsewhere.
    Reference,
    Text,
    Number,
    Object,
    Model(Variant),
}

impl OptionKind {
    fn expected(self) -> &'static str {
        match self {
            OptionKind::Identifier | OptionKind::Reference | OptionKind::Text | OptionKind::Model(_) => "a string",
            OptionKind::Number => "a number",
            OptionKind::Object => "an object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub key: &'static str,
    pub kind: OptionKind,
    pub requirement: Requirement,
}

impl OptionSpec {
    pub fn new(key: &'static str, kind: OptionKind, requirement: Requirement) -> Self {
        OptionSpec { key, kind, requirement }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    options: Vec<OptionSpec>,
}

#[derive(Debug)]
pub enum SchemaError {
    NotAnObject,
    MissingPlatform,
    UnknownPlatform(String),
    MissingOption(&'static str),
    UnknownOption(String),
    InvalidType { key: &'static str, expected: &'static str },
    MalformedIdentifier { key: &'static str, value: String },
    Model(ModelError),
    NoTransmitterDeclared,
    AmbiguousTransmitter(Vec<PeripheralId>),
    /// Effective visual range is empty (`min > max`).
    InvertedVisualRange { min: f32, max: f32 },
    InvalidTemperatureStep(f32),
    Deserialize(serde_path_to_error::Error<serde_json::Error>),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::NotAnObject => write!(f, "climate entry must be an object"),
            SchemaError::MissingPlatform => write!(f, "missing required option 'platform'"),
            SchemaError::UnknownPlatform(p) => write!(f, "unknown platform \"{}\"", p),
            SchemaError::MissingOption(k) => write!(f, "missing required option '{}'", k),
            SchemaError::UnknownOption(k) => write!(f, "unknown option '{}'", k),
            SchemaError::InvalidType { key, expected } => write!(f, "option '{}' must be {}", key, expected),
            SchemaError::MalformedIdentifier { key, value } => {
                write!(f, "option '{}' is not a valid identifier: \"{}\"", key, value)
            }
            SchemaError::Model(e) => write!(f, "{}", e),
            SchemaError::NoTransmitterDeclared => {
                write!(f, "transmitter_id omitted and no remote_transmitter is declared")
            }
            SchemaError::AmbiguousTransmitter(ids) => {
                let names = ids.iter().map(|id| id.0.as_str()).collect::<Vec<_>>().join(", ");
                write!(f, "transmitter_id omitted but several transmitters are declared ({})", names)
            }
            SchemaError::InvertedVisualRange { min, max } => {
                write!(f, "visual min_temperature {} is above max_temperature {}", min, max)
            }
            SchemaError::InvalidTemperatureStep(step) => {
                write!(f, "visual temperature_step must be positive, got {}", step)
            }
            SchemaError::Deserialize(e) => write!(f, "invalid value at '{}': {}", e.path(), e.inner()),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Model(e) => Some(e),
            SchemaError::Deserialize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelError> for SchemaError {
    fn from(value: ModelError) -> Self {
        SchemaError::Model(value)
    }
}

/// State shared across the entries of one document.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    transmitters: Vec<PeripheralId>,
    taken: BTreeSet<String>,
    generated: usize,
}

impl ValidationContext {
    pub fn new(transmitters: Vec<PeripheralId>) -> Self {
        ValidationContext {
            transmitters,
            taken: BTreeSet::new(),
            generated: 0,
        }
    }

    /// Identifiers given explicitly elsewhere in the document; never generated.
    pub fn with_reserved_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.taken.extend(ids);
        self
    }

    fn next_id(&mut self, prefix: &str) -> String {
        loop {
            let id = format!("{}_{}", prefix, self.generated);
            self.generated += 1;
            if self.taken.insert(id.clone()) {
                return id;
            }
        }
    }

    fn sole_transmitter(&self) -> Result<&PeripheralId, SchemaError> {
        match self.transmitters.as_slice() {
            [only] => Ok(only),
            [] => Err(SchemaError::NoTransmitterDeclared),
            many => Err(SchemaError::AmbiguousTransmitter(many.to_vec())),
        }
    }
}

impl Schema {
    pub fn new(options: Vec<OptionSpec>) -> Self {
        Schema { options }
    }

    pub fn extend(mut self, other: Schema) -> Self {
        for option in other.options {
            match self.options.iter_mut().find(|o| o.key == option.key) {
                Some(existing) => *existing = option,
                None => self.options.push(option),
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.options.iter().map(|o| o.key)
    }

    /// Check `raw` against the table and return the normalized record.
    pub fn validate(&self, raw: &Map<String, Value>, ctx: &mut ValidationContext) -> Result<Map<String, Value>, SchemaError> {
        if let Some(unknown) = raw.keys().find(|k| self.get(k).is_none()) {
            return Err(SchemaError::UnknownOption(unknown.clone()));
        }

        let mut out = Map::new();
        for option in &self.options {
            let value = match raw.get(option.key) {
                Some(v) => {
                    check_kind(option, v)?;
                    v.clone()
                }
                None => match &option.requirement {
                    Requirement::Required => return Err(SchemaError::MissingOption(option.key)),
                    Requirement::Optional => continue,
                    Requirement::Default(v) => v.clone(),
                    Requirement::GenerateId(prefix) => Value::String(ctx.next_id(prefix)),
                    Requirement::SoleTransmitter => Value::String(ctx.sole_transmitter()?.0.clone()),
                },
            };
            out.insert(option.key.to_string(), value);
        }
        Ok(out)
    }
}

fn check_kind(option: &OptionSpec, value: &Value) -> Result<(), SchemaError> {
    let type_error = || SchemaError::InvalidType {
        key: option.key,
        expected: option.kind.expected(),
    };
    match option.kind {
        OptionKind::Identifier | OptionKind::Reference => {
            let s = value.as_str().ok_or_else(type_error)?;
            if !is_valid_identifier(s) {
                return Err(SchemaError::MalformedIdentifier {
                    key: option.key,
                    value: s.to_string(),
                });
            }
        }
        OptionKind::Text => {
            value.as_str().ok_or_else(type_error)?;
        }
        OptionKind::Number => {
            value.as_f64().ok_or_else(type_error)?;
        }
        OptionKind::Object => {
            value.as_object().ok_or_else(type_error)?;
        }
        OptionKind::Model(variant) => {
            let token = value.as_str().ok_or_else(type_error)?;
            variant.resolve_model(token)?;
        }
    }
    Ok(())
}

// =====================
// Base option tables
// =====================

pub fn climate_options() -> Schema {
    Schema::new(vec![
        OptionSpec::new("platform", OptionKind::Text, Requirement::Required),
        OptionSpec::new("id", OptionKind::Identifier, Requirement::GenerateId("haier_climate")),
        OptionSpec::new("name", OptionKind::Text, Requirement::Required),
    ])
}

pub fn visual_options() -> Schema {
    Schema::new(vec![OptionSpec::new("visual", OptionKind::Object, Requirement::Optional)])
}

pub fn ir_options() -> Schema {
    Schema::new(vec![
        OptionSpec::new("transmitter_id", OptionKind::Reference, Requirement::Required),
        OptionSpec::new("receiver_id", OptionKind::Reference, Requirement::Optional),
    ])
}

pub fn component_options() -> Schema {
    Schema::new(vec![OptionSpec::new(
        "setup_priority",
        OptionKind::Number,
        Requirement::Default(Value::from(DEFAULT_SETUP_PRIORITY as f64)),
    )])
}

pub fn for_variant(variant: Variant) -> Schema {
    let model = match variant.default_model() {
        Some(default) => Requirement::Default(Value::String(default.as_str().to_string())),
        None => Requirement::Required,
    };
    let mut own = vec![OptionSpec::new("model", OptionKind::Model(variant), model)];
    if variant.transmitter_implicit() {
        own.push(OptionSpec::new(
            "transmitter_id",
            OptionKind::Reference,
            Requirement::SoleTransmitter,
        ));
    }

    climate_options()
        .extend(visual_options())
        .extend(ir_options())
        .extend(Schema::new(own))
        .extend(component_options())
}

/// Validate one raw `climate:` entry into a typed config.
pub fn validate_entry(raw: &Value, ctx: &mut ValidationContext) -> Result<ClimateEntityConfig, SchemaError> {
    let obj = raw.as_object().ok_or(SchemaError::NotAnObject)?;
    let platform = match obj.get("platform") {
        Some(Value::String(p)) => p,
        Some(_) => {
            return Err(SchemaError::InvalidType {
                key: "platform",
                expected: "a string",
            });
        }
        None => return Err(SchemaError::MissingPlatform),
    };
    let variant = Variant::from_platform(platform).ok_or_else(|| SchemaError::UnknownPlatform(platform.clone()))?;

    let normalized = for_variant(variant).validate(obj, ctx)?;
    let cfg: ClimateEntityConfig =
        serde_path_to_error::deserialize(Value::Object(normalized)).map_err(SchemaError::Deserialize)?;
    if let Some(visual) = &cfg.visual {
        check_visual(visual)?;
    }
    Ok(cfg)
}

/// Omitted bounds fall back to the remote's range before comparing.
fn check_visual(visual: &VisualConfig) -> Result<(), SchemaError> {
    let min = visual.min_temperature.unwrap_or(HAIER_MIN_TEMP_C as f32);
    let max = visual.max_temperature.unwrap_or(HAIER_MAX_TEMP_C as f32);
    if min > max {
        return Err(SchemaError::InvertedVisualRange { min, max });
    }
    if let Some(step) = visual.temperature_step
        && step <= 0.0
    {
        return Err(SchemaError::InvalidTemperatureStep(step));
    }
    Ok(())
}
