//! Transmitter/receiver peripherals and the typed registry they are declared in.
//!
//! Peripherals are owned by the registry and shared with entities by `Rc`.
//! Frame encoding/decoding belongs to the IR library behind these traits; the
//! entity only ever sees `HaierAcState`.

use crate::models::haier::{HaierAcState, PeripheralId, ReceiverConfig, TransmitterConfig};
use crate::services::wiring::WiringError;
use core::fmt;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitError {
    /// No transmitter attached to the entity.
    NotAttached,
    Hardware(String),
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitError::NotAttached => write!(f, "no transmitter attached"),
            TransmitError::Hardware(e) => write!(f, "transmitter hardware error: {}", e),
        }
    }
}

impl std::error::Error for TransmitError {}

pub trait Transmitter {
    fn transmit(&self, state: &HaierAcState) -> Result<(), TransmitError>;
}

/// Notified with every decoded frame; returns whether the frame was consumed.
pub trait ReceiveListener {
    fn on_receive(&self, state: &HaierAcState) -> bool;
}

pub trait Receiver {
    fn add_listener(&self, listener: Rc<dyn ReceiveListener>);
}

/// IR LED transmitter on a GPIO pin.
#[derive(Debug)]
pub struct RemoteTransmitter {
    config: TransmitterConfig,
    sent: RefCell<Vec<HaierAcState>>,
}

impl RemoteTransmitter {
    pub fn new(config: TransmitterConfig) -> Self {
        RemoteTransmitter {
            config,
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn last_sent(&self) -> Option<HaierAcState> {
        self.sent.borrow().last().copied()
    }
}

impl Transmitter for RemoteTransmitter {
    fn transmit(&self, state: &HaierAcState) -> Result<(), TransmitError> {
        debug!(
            "Transmitter {} (pin {}, duty {}%): {}",
            self.config.id, self.config.pin, self.config.carrier_duty_percent, state
        );
        self.sent.borrow_mut().push(*state);
        Ok(())
    }
}

/// IR demodulator on a GPIO pin; fans decoded frames out to listeners.
pub struct RemoteReceiver {
    config: ReceiverConfig,
    listeners: RefCell<Vec<Rc<dyn ReceiveListener>>>,
}

impl RemoteReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        RemoteReceiver {
            config,
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Offer a decoded frame to listeners until one consumes it.
    pub fn dispatch(&self, state: &HaierAcState) -> bool {
        // snapshot so listeners may register further listeners
        let listeners = self.listeners.borrow().clone();
        let consumed = listeners.iter().any(|l| l.on_receive(state));
        if !consumed {
            debug!("Receiver {} (pin {}): frame ignored: {}", self.config.id, self.config.pin, state);
        }
        consumed
    }
}

impl Receiver for RemoteReceiver {
    fn add_listener(&self, listener: Rc<dyn ReceiveListener>) {
        self.listeners.borrow_mut().push(listener);
    }
}

/// Declared peripherals keyed by identifier.
#[derive(Default)]
pub struct PeripheralRegistry {
    transmitters: BTreeMap<PeripheralId, Rc<dyn Transmitter>>,
    receivers: BTreeMap<PeripheralId, Rc<dyn Receiver>>,
}

impl PeripheralRegistry {
    pub fn declare_transmitter(&mut self, id: PeripheralId, handle: Rc<dyn Transmitter>) -> Result<(), WiringError> {
        if self.transmitters.contains_key(&id) || self.receivers.contains_key(&id) {
            return Err(WiringError::DuplicatePeripheral(id));
        }
        info!("Declared transmitter {}", id);
        self.transmitters.insert(id, handle);
        Ok(())
    }

    pub fn declare_receiver(&mut self, id: PeripheralId, handle: Rc<dyn Receiver>) -> Result<(), WiringError> {
        if self.transmitters.contains_key(&id) || self.receivers.contains_key(&id) {
            return Err(WiringError::DuplicatePeripheral(id));
        }
        info!("Declared receiver {}", id);
        self.receivers.insert(id, handle);
        Ok(())
    }

    pub fn transmitter(&self, id: &PeripheralId) -> Result<Rc<dyn Transmitter>, WiringError> {
        self.transmitters
            .get(id)
            .cloned()
            .ok_or_else(|| WiringError::UndeclaredTransmitter(id.clone()))
    }

    pub fn receiver(&self, id: &PeripheralId) -> Result<Rc<dyn Receiver>, WiringError> {
        self.receivers
            .get(id)
            .cloned()
            .ok_or_else(|| WiringError::UndeclaredReceiver(id.clone()))
    }

    pub fn transmitter_ids(&self) -> Vec<PeripheralId> {
        self.transmitters.keys().cloned().collect()
    }
}
