//! The Haier IR climate entity.
//!
//! Holds the user-facing climate state, translates it into a `HaierAcState`
//! for the attached transmitter and folds decoded frames from the optional
//! receiver back into the climate state.

use crate::models::climate::{ClimateCall, ClimateMode, ClimateState, ClimateTraits, FanMode, SwingMode};
use crate::models::haier::{
    DEFAULT_SETUP_PRIORITY, EntityId, HAIER_DEFAULT_TEMP_C, HAIER_MAX_TEMP_C, HAIER_MIN_TEMP_C, HaierAcState,
    HaierCommand, HaierFan, HaierMode, HaierSwingV, ModelSelector, PeripheralId, VisualConfig,
};
use crate::services::peripherals::{ReceiveListener, Receiver, TransmitError, Transmitter};
use crate::services::registry::{Climate, Component, Entity, Lifecycle, LifecycleError, LifecycleState};
use crate::services::wiring::WiringError;
use log::{info, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

const TAG: &str = "haier.climate";

struct Attached<T: ?Sized> {
    id: PeripheralId,
    handle: Rc<T>,
}

pub struct HaierClimate {
    id: EntityId,
    name: String,
    setup_priority: f32,
    visual: Option<VisualConfig>,
    transmitter: Option<Attached<dyn Transmitter>>,
    receiver: Option<Attached<dyn Receiver>>,
    lifecycle: Lifecycle,

    mode: ClimateMode,
    target_temperature: f32,
    fan_mode: Option<FanMode>,
    swing_mode: SwingMode,
    ac: HaierAcState,
}

impl HaierClimate {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        HaierClimate {
            id,
            name: name.into(),
            setup_priority: DEFAULT_SETUP_PRIORITY,
            visual: None,
            transmitter: None,
            receiver: None,
            lifecycle: Lifecycle::default(),
            mode: ClimateMode::Off,
            target_temperature: HAIER_DEFAULT_TEMP_C as f32,
            fan_mode: None,
            swing_mode: SwingMode::Off,
            ac: HaierAcState::new(ModelSelector::default()),
        }
    }

    fn ensure_unsealed(&self) -> Result<(), WiringError> {
        if self.lifecycle.state() >= LifecycleState::Registered {
            return Err(WiringError::Sealed(self.id.clone()));
        }
        Ok(())
    }

    /// Attach the transmitter. Only one may ever be attached.
    pub fn set_transmitter(&mut self, id: PeripheralId, handle: Rc<dyn Transmitter>) -> Result<(), WiringError> {
        self.ensure_unsealed()?;
        if let Some(existing) = &self.transmitter {
            return Err(WiringError::TransmitterAlreadyAttached {
                entity: self.id.clone(),
                existing: existing.id.clone(),
            });
        }
        self.transmitter = Some(Attached { id, handle });
        Ok(())
    }

    /// Attach the optional receiver. Only one may ever be attached.
    pub fn set_receiver(&mut self, id: PeripheralId, handle: Rc<dyn Receiver>) -> Result<(), WiringError> {
        self.ensure_unsealed()?;
        if let Some(existing) = &self.receiver {
            return Err(WiringError::ReceiverAlreadyAttached {
                entity: self.id.clone(),
                existing: existing.id.clone(),
            });
        }
        self.receiver = Some(Attached { id, handle });
        Ok(())
    }

    pub fn set_model(&mut self, model: ModelSelector) -> Result<(), WiringError> {
        self.ensure_unsealed()?;
        self.ac.model = model;
        Ok(())
    }

    pub fn set_visual(&mut self, visual: Option<VisualConfig>) -> Result<(), WiringError> {
        self.ensure_unsealed()?;
        self.visual = visual;
        Ok(())
    }

    pub fn set_setup_priority(&mut self, priority: f32) -> Result<(), WiringError> {
        self.ensure_unsealed()?;
        self.setup_priority = priority;
        Ok(())
    }

    /// Close wiring: requires a transmitter, moves to `Configured`.
    pub fn finish_wiring(&mut self) -> Result<(), WiringError> {
        if self.transmitter.is_none() {
            return Err(WiringError::MissingTransmitter(self.id.clone()));
        }
        let id = self.id.clone();
        self.lifecycle.advance(&id, LifecycleState::Configured)?;
        Ok(())
    }

    pub fn model(&self) -> ModelSelector {
        self.ac.model
    }

    pub fn transmitter_id(&self) -> Option<&PeripheralId> {
        self.transmitter.as_ref().map(|t| &t.id)
    }

    pub fn receiver_id(&self) -> Option<&PeripheralId> {
        self.receiver.as_ref().map(|r| &r.id)
    }

    pub fn ac_state(&self) -> &HaierAcState {
        &self.ac
    }

    pub fn set_health(&mut self, on: bool) {
        self.ac.health = on;
        info!("[{}] {}: setting health filter: {}", TAG, self.id, if on { "ON" } else { "OFF" });
    }

    pub fn health(&self) -> bool {
        self.ac.health
    }

    pub fn set_sleep(&mut self, on: bool) {
        self.ac.sleep = on;
        info!("[{}] {}: setting sleep mode: {}", TAG, self.id, if on { "ON" } else { "OFF" });
    }

    pub fn sleep(&self) -> bool {
        self.ac.sleep
    }

    /// Translate the climate state into the remote state.
    pub fn apply_state(&mut self) {
        if self.mode == ClimateMode::Off {
            self.ac.command = HaierCommand::Off;
        } else {
            self.ac.set_temp(self.target_temperature);

            match self.mode {
                ClimateMode::HeatCool | ClimateMode::Auto => self.ac.mode = HaierMode::Auto,
                ClimateMode::Heat => self.ac.mode = HaierMode::Heat,
                ClimateMode::Cool => self.ac.mode = HaierMode::Cool,
                ClimateMode::Dry => self.ac.mode = HaierMode::Dry,
                ClimateMode::FanOnly => self.ac.mode = HaierMode::Fan,
                ClimateMode::Off => {}
            }

            if let Some(fan) = self.fan_mode {
                self.ac.fan = match fan {
                    FanMode::Auto => HaierFan::Auto,
                    FanMode::Low => HaierFan::Low,
                    FanMode::Medium => HaierFan::Medium,
                    FanMode::High => HaierFan::High,
                    // not expressible on this remote
                    _ => HaierFan::Auto,
                };
            }

            match self.swing_mode {
                SwingMode::Off => self.ac.swing_v = HaierSwingV::Off,
                SwingMode::Vertical => self.ac.swing_v = HaierSwingV::Change,
                SwingMode::Horizontal | SwingMode::Both => {}
            }

            self.ac.command = HaierCommand::On;
        }

        info!("[{}] {}: {}", TAG, self.id, self.ac);
    }

    pub fn transmit_state(&mut self) -> Result<(), TransmitError> {
        self.apply_state();
        let result = match &self.transmitter {
            Some(transmitter) => transmitter.handle.transmit(&self.ac),
            None => Err(TransmitError::NotAttached),
        };
        if let Err(e) = &result {
            warn!("[{}] {}: transmit failed: {}", TAG, self.id, e);
        }
        result
    }

    /// Fold a decoded frame into the climate state. Frames for another remote
    /// model are not consumed.
    pub fn on_receive(&mut self, state: &HaierAcState) -> bool {
        if state.model != self.ac.model {
            return false;
        }

        self.mode = match (state.command, state.mode) {
            (HaierCommand::Off, _) => ClimateMode::Off,
            (HaierCommand::On, HaierMode::Auto) => ClimateMode::HeatCool,
            (HaierCommand::On, HaierMode::Cool) => ClimateMode::Cool,
            (HaierCommand::On, HaierMode::Heat) => ClimateMode::Heat,
            (HaierCommand::On, HaierMode::Dry) => ClimateMode::Dry,
            (HaierCommand::On, HaierMode::Fan) => ClimateMode::FanOnly,
        };
        self.target_temperature = state.temp_c as f32;
        self.fan_mode = Some(match state.fan {
            HaierFan::Auto => FanMode::Auto,
            HaierFan::Low => FanMode::Low,
            HaierFan::Medium => FanMode::Medium,
            HaierFan::High => FanMode::High,
        });
        self.swing_mode = match state.swing_v {
            HaierSwingV::Off => SwingMode::Off,
            HaierSwingV::Change => SwingMode::Vertical,
        };
        self.ac = *state;
        info!("[{}] {}: received {}", TAG, self.id, state);
        true
    }
}

impl Entity for HaierClimate {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl Component for HaierClimate {
    fn setup_priority(&self) -> f32 {
        self.setup_priority
    }

    fn setup(&mut self) -> Result<(), LifecycleError> {
        self.apply_state();
        let id = self.id.clone();
        self.lifecycle.advance(&id, LifecycleState::Active)
    }

    fn dump_config(&self) {
        info!("[{}] Haier climate '{}'", TAG, self.name);
        info!("[{}]   id: {}", TAG, self.id);
        info!("[{}]   model: {}", TAG, self.ac.model);
        match &self.transmitter {
            Some(t) => info!("[{}]   transmitter: {}", TAG, t.id),
            None => info!("[{}]   transmitter: -", TAG),
        }
        match &self.receiver {
            Some(r) => info!("[{}]   receiver: {}", TAG, r.id),
            None => info!("[{}]   receiver: -", TAG),
        }
        info!("[{}]   lifecycle: {:?}", TAG, self.lifecycle.state());
    }
}

impl Climate for HaierClimate {
    fn name(&self) -> &str {
        &self.name
    }

    fn traits(&self) -> ClimateTraits {
        let mut traits = ClimateTraits {
            supported_modes: vec![
                ClimateMode::Off,
                ClimateMode::HeatCool,
                ClimateMode::Cool,
                ClimateMode::Heat,
                ClimateMode::Dry,
                ClimateMode::FanOnly,
            ],
            supported_fan_modes: vec![FanMode::Auto, FanMode::Low, FanMode::Medium, FanMode::High],
            supported_swing_modes: vec![SwingMode::Off],
            visual_min_temperature: HAIER_MIN_TEMP_C as f32,
            visual_max_temperature: HAIER_MAX_TEMP_C as f32,
            visual_temperature_step: 1.0,
        };
        traits.add_supported_swing_mode(SwingMode::Vertical);
        if let Some(visual) = &self.visual {
            if let Some(min) = visual.min_temperature {
                traits.visual_min_temperature = min;
            }
            if let Some(max) = visual.max_temperature {
                traits.visual_max_temperature = max;
            }
            if let Some(step) = visual.temperature_step {
                traits.visual_temperature_step = step;
            }
        }
        traits
    }

    fn state(&self) -> ClimateState {
        ClimateState {
            mode: self.mode,
            target_temperature: self.target_temperature,
            fan_mode: self.fan_mode,
            swing_mode: self.swing_mode,
        }
    }

    fn control(&mut self, call: &ClimateCall) -> Result<(), TransmitError> {
        let traits = self.traits();
        if let Some(mode) = call.mode {
            if traits.supports_mode(mode) {
                self.mode = mode;
            } else {
                warn!("[{}] {}: mode {:?} not supported", TAG, self.id, mode);
            }
        }
        if let Some(target) = call.target_temperature {
            // the remote cannot send anything outside its own range
            self.target_temperature =
                traits.clamp_temperature(target).clamp(HAIER_MIN_TEMP_C as f32, HAIER_MAX_TEMP_C as f32);
        }
        if let Some(fan) = call.fan_mode {
            if traits.supports_fan_mode(fan) {
                self.fan_mode = Some(fan);
            } else {
                warn!("[{}] {}: fan mode {:?} not supported", TAG, self.id, fan);
            }
        }
        if let Some(swing) = call.swing_mode {
            if traits.supports_swing_mode(swing) {
                self.swing_mode = swing;
            } else {
                warn!("[{}] {}: swing mode {:?} not supported", TAG, self.id, swing);
            }
        }
        self.transmit_state()
    }
}

/// Receive listener that forwards to an entity without keeping it alive.
pub struct ClimateListener {
    entity: Weak<RefCell<HaierClimate>>,
}

impl ReceiveListener for ClimateListener {
    fn on_receive(&self, state: &HaierAcState) -> bool {
        let Some(entity) = self.entity.upgrade() else {
            return false;
        };
        // busy entity (e.g. our own transmission looping back) drops the frame
        match entity.try_borrow_mut() {
            Ok(mut climate) => climate.on_receive(state),
            Err(_) => false,
        }
    }
}

/// Subscribe the entity to its attached receiver, if any.
pub fn attach_receive_listener(entity: &Rc<RefCell<HaierClimate>>) {
    let receiver = entity.borrow().receiver.as_ref().map(|r| r.handle.clone());
    if let Some(receiver) = receiver {
        receiver.add_listener(Rc::new(ClimateListener {
            entity: Rc::downgrade(entity),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::haier::{ReceiverConfig, TransmitterConfig};
    use crate::services::peripherals::{RemoteReceiver, RemoteTransmitter};

    struct FailingTransmitter;

    impl Transmitter for FailingTransmitter {
        fn transmit(&self, _state: &HaierAcState) -> Result<(), TransmitError> {
            Err(TransmitError::Hardware("led open circuit".into()))
        }
    }

    fn transmitter() -> Rc<RemoteTransmitter> {
        Rc::new(RemoteTransmitter::new(TransmitterConfig {
            id: PeripheralId::from("tx1"),
            pin: 4,
            carrier_duty_percent: 50,
        }))
    }

    fn wired(tx: Rc<RemoteTransmitter>) -> HaierClimate {
        let mut climate = HaierClimate::new(EntityId::from("ac"), "AC");
        climate.set_transmitter(PeripheralId::from("tx1"), tx).unwrap();
        climate.finish_wiring().unwrap();
        climate
    }

    #[test]
    fn off_sends_off_command_only() {
        let tx = transmitter();
        let mut climate = wired(tx.clone());
        climate.control(&ClimateCall::new().with_mode(ClimateMode::Off)).unwrap();
        let sent = tx.last_sent().unwrap();
        assert_eq!(sent.command, HaierCommand::Off);
        assert_eq!(sent.temp_c, HAIER_DEFAULT_TEMP_C);
    }

    #[test]
    fn modes_map_to_remote_modes() {
        let cases = [
            (ClimateMode::HeatCool, HaierMode::Auto),
            (ClimateMode::Heat, HaierMode::Heat),
            (ClimateMode::Cool, HaierMode::Cool),
            (ClimateMode::Dry, HaierMode::Dry),
            (ClimateMode::FanOnly, HaierMode::Fan),
        ];
        let tx = transmitter();
        let mut climate = wired(tx.clone());
        for (mode, expected) in cases {
            climate.control(&ClimateCall::new().with_mode(mode)).unwrap();
            let sent = tx.last_sent().unwrap();
            assert_eq!((sent.command, sent.mode), (HaierCommand::On, expected), "{mode:?}");
        }
        assert_eq!(tx.sent_count(), cases.len());
    }

    #[test]
    fn unsupported_fan_falls_back_to_auto_in_apply_state() {
        let mut climate = wired(transmitter());
        climate.mode = ClimateMode::Cool;
        climate.fan_mode = Some(FanMode::Quiet);
        climate.apply_state();
        assert_eq!(climate.ac_state().fan, HaierFan::Auto);

        climate.fan_mode = Some(FanMode::High);
        climate.apply_state();
        assert_eq!(climate.ac_state().fan, HaierFan::High);
    }

    #[test]
    fn unsupported_control_values_are_ignored() {
        let mut climate = wired(transmitter());
        climate
            .control(
                &ClimateCall::new()
                    .with_mode(ClimateMode::Auto)
                    .with_fan_mode(FanMode::Diffuse)
                    .with_swing_mode(SwingMode::Both),
            )
            .unwrap();
        let state = climate.state();
        assert_eq!(state.mode, ClimateMode::Off);
        assert_eq!(state.fan_mode, None);
        assert_eq!(state.swing_mode, SwingMode::Off);
    }

    #[test]
    fn swing_and_temperature() {
        let tx = transmitter();
        let mut climate = wired(tx.clone());
        climate
            .control(
                &ClimateCall::new()
                    .with_mode(ClimateMode::Heat)
                    .with_target_temperature(35.0)
                    .with_swing_mode(SwingMode::Vertical),
            )
            .unwrap();
        let sent = tx.last_sent().unwrap();
        assert_eq!(sent.swing_v, HaierSwingV::Change);
        assert_eq!(sent.temp_c, HAIER_MAX_TEMP_C);
        assert_eq!(climate.state().target_temperature, HAIER_MAX_TEMP_C as f32);

        climate.control(&ClimateCall::new().with_swing_mode(SwingMode::Off)).unwrap();
        assert_eq!(tx.last_sent().unwrap().swing_v, HaierSwingV::Off);
    }

    #[test]
    fn visual_overrides_traits() {
        let mut climate = HaierClimate::new(EntityId::from("ac"), "AC");
        climate
            .set_visual(Some(VisualConfig {
                min_temperature: Some(18.0),
                max_temperature: None,
                temperature_step: Some(0.5),
            }))
            .unwrap();
        let traits = climate.traits();
        assert_eq!(traits.visual_min_temperature, 18.0);
        assert_eq!(traits.visual_max_temperature, HAIER_MAX_TEMP_C as f32);
        assert_eq!(traits.visual_temperature_step, 0.5);
        assert!(traits.supports_swing_mode(SwingMode::Vertical));
        assert!(!traits.supports_mode(ClimateMode::Auto));
    }

    #[test]
    fn narrowed_visual_range_clamps_target() {
        let tx = transmitter();
        let mut climate = wired(tx.clone());
        climate.visual = Some(VisualConfig {
            min_temperature: Some(18.0),
            max_temperature: Some(26.0),
            temperature_step: None,
        });
        climate
            .control(&ClimateCall::new().with_mode(ClimateMode::Cool).with_target_temperature(22.0))
            .unwrap();
        assert_eq!(tx.last_sent().unwrap().temp_c, 22);
        climate.control(&ClimateCall::new().with_target_temperature(29.0)).unwrap();
        assert_eq!(climate.state().target_temperature, 26.0);
        climate.control(&ClimateCall::new().with_target_temperature(12.0)).unwrap();
        assert_eq!(climate.state().target_temperature, 18.0);
        assert_eq!(tx.last_sent().unwrap().temp_c, 18);
    }

    #[test]
    fn widened_visual_range_reports_sent_target() {
        let tx = transmitter();
        let mut climate = wired(tx.clone());
        climate.visual = Some(VisualConfig {
            min_temperature: Some(10.0),
            max_temperature: Some(35.0),
            temperature_step: None,
        });
        climate
            .control(&ClimateCall::new().with_mode(ClimateMode::Heat).with_target_temperature(10.0))
            .unwrap();
        assert_eq!(climate.state().target_temperature, HAIER_MIN_TEMP_C as f32);
        assert_eq!(tx.last_sent().unwrap().temp_c, HAIER_MIN_TEMP_C);
        climate.control(&ClimateCall::new().with_target_temperature(35.0)).unwrap();
        assert_eq!(climate.state().target_temperature, HAIER_MAX_TEMP_C as f32);
    }

    #[test]
    fn transmit_errors_surface() {
        let mut climate = HaierClimate::new(EntityId::from("ac"), "AC");
        assert_eq!(
            climate.control(&ClimateCall::new().with_mode(ClimateMode::Cool)),
            Err(TransmitError::NotAttached)
        );
        climate
            .set_transmitter(PeripheralId::from("bad"), Rc::new(FailingTransmitter))
            .unwrap();
        assert!(matches!(
            climate.control(&ClimateCall::new()),
            Err(TransmitError::Hardware(_))
        ));
    }

    #[test]
    fn health_and_sleep_travel_with_next_frame() {
        let tx = transmitter();
        let mut climate = wired(tx.clone());
        climate.set_health(false);
        climate.set_sleep(true);
        assert!(!climate.health());
        assert!(climate.sleep());
        assert_eq!(tx.sent_count(), 0);
        climate.control(&ClimateCall::new().with_mode(ClimateMode::Cool)).unwrap();
        let sent = tx.last_sent().unwrap();
        assert!(!sent.health && sent.sleep);
    }

    #[test]
    fn wiring_sealed_after_registration() {
        let mut climate = wired(transmitter());
        let id = climate.id().clone();
        climate.lifecycle_mut().advance(&id, LifecycleState::Registered).unwrap();
        assert!(matches!(
            climate.set_model(ModelSelector::V9014557B),
            Err(WiringError::Sealed(_))
        ));
        assert_eq!(climate.model(), ModelSelector::V9014557A);
    }

    #[test]
    fn receiver_frames_update_state() {
        let rx = Rc::new(RemoteReceiver::new(ReceiverConfig {
            id: PeripheralId::from("rx1"),
            pin: 14,
        }));
        let mut climate = HaierClimate::new(EntityId::from("ac"), "AC");
        climate.set_transmitter(PeripheralId::from("tx1"), transmitter()).unwrap();
        climate.set_receiver(PeripheralId::from("rx1"), rx.clone()).unwrap();
        climate.set_model(ModelSelector::V9014557B).unwrap();
        let entity = Rc::new(RefCell::new(climate));
        attach_receive_listener(&entity);
        assert_eq!(rx.listener_count(), 1);

        let mut frame = HaierAcState::new(ModelSelector::V9014557A);
        frame.command = HaierCommand::On;
        assert!(!rx.dispatch(&frame), "foreign model consumed");

        frame.model = ModelSelector::V9014557B;
        frame.mode = HaierMode::Dry;
        frame.temp_c = 20;
        frame.fan = HaierFan::Low;
        frame.swing_v = HaierSwingV::Change;
        assert!(rx.dispatch(&frame));

        let state = entity.borrow().state();
        assert_eq!(state.mode, ClimateMode::Dry);
        assert_eq!(state.target_temperature, 20.0);
        assert_eq!(state.fan_mode, Some(FanMode::Low));
        assert_eq!(state.swing_mode, SwingMode::Vertical);

        drop(entity);
        assert!(!rx.dispatch(&frame));
    }
}
