//! One-shot construction of a climate entity from a validated config.
//!
//! Every peripheral reference is resolved before the entity exists, so an
//! undeclared identifier never leaves a half-built entity behind.

use crate::models::haier::{ClimateEntityConfig, EntityId, PeripheralId};
use crate::services::climate::{HaierClimate, attach_receive_listener};
use crate::services::peripherals::{PeripheralRegistry, Receiver, Transmitter};
use crate::services::registry::LifecycleError;
use core::fmt;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringError {
    UndeclaredTransmitter(PeripheralId),
    UndeclaredReceiver(PeripheralId),
    DuplicatePeripheral(PeripheralId),
    MissingTransmitter(EntityId),
    TransmitterAlreadyAttached { entity: EntityId, existing: PeripheralId },
    ReceiverAlreadyAttached { entity: EntityId, existing: PeripheralId },
    /// Wiring is closed once the entity is registered.
    Sealed(EntityId),
    Lifecycle(LifecycleError),
}

impl fmt::Display for WiringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WiringError::UndeclaredTransmitter(id) => write!(f, "transmitter '{}' is not declared", id),
            WiringError::UndeclaredReceiver(id) => write!(f, "receiver '{}' is not declared", id),
            WiringError::DuplicatePeripheral(id) => write!(f, "peripheral '{}' is declared more than once", id),
            WiringError::MissingTransmitter(id) => write!(f, "entity {} has no transmitter attached", id),
            WiringError::TransmitterAlreadyAttached { entity, existing } => {
                write!(f, "entity {} already has transmitter '{}' attached", entity, existing)
            }
            WiringError::ReceiverAlreadyAttached { entity, existing } => {
                write!(f, "entity {} already has receiver '{}' attached", entity, existing)
            }
            WiringError::Sealed(id) => write!(f, "entity {} is registered; wiring can no longer change", id),
            WiringError::Lifecycle(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WiringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WiringError::Lifecycle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LifecycleError> for WiringError {
    fn from(value: LifecycleError) -> Self {
        WiringError::Lifecycle(value)
    }
}

struct Resolved {
    transmitter: Rc<dyn Transmitter>,
    receiver: Option<Rc<dyn Receiver>>,
}

fn resolve(cfg: &ClimateEntityConfig, peripherals: &PeripheralRegistry) -> Result<Resolved, WiringError> {
    let transmitter = peripherals.transmitter(&cfg.transmitter_id)?;
    let receiver = match &cfg.receiver_id {
        Some(id) => Some(peripherals.receiver(id)?),
        None => None,
    };
    Ok(Resolved { transmitter, receiver })
}

/// Build a `Configured` entity from `cfg`.
pub fn wire(cfg: ClimateEntityConfig, peripherals: &PeripheralRegistry) -> Result<Rc<RefCell<HaierClimate>>, WiringError> {
    let resolved = resolve(&cfg, peripherals)?;

    let mut climate = HaierClimate::new(cfg.id.clone(), cfg.name);
    climate.set_transmitter(cfg.transmitter_id.clone(), resolved.transmitter)?;
    if let (Some(id), Some(receiver)) = (cfg.receiver_id.clone(), resolved.receiver) {
        climate.set_receiver(id, receiver)?;
    }
    climate.set_model(cfg.model)?;
    climate.set_visual(cfg.visual)?;
    climate.set_setup_priority(cfg.setup_priority)?;
    climate.finish_wiring()?;

    debug!(
        "Wired {} ({}, model {}) to transmitter {}{}",
        cfg.id,
        cfg.platform,
        cfg.model,
        cfg.transmitter_id,
        cfg.receiver_id
            .as_ref()
            .map(|r| format!(", receiver {}", r))
            .unwrap_or_default()
    );

    let entity = Rc::new(RefCell::new(climate));
    attach_receive_listener(&entity);
    Ok(entity)
}
