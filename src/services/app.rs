//! Setup pipeline: declare peripherals, then validate, wire and register every
//! climate entry of a configuration document.

use crate::models::haier::{ConfigDocument, EntityId, PeripheralId};
use crate::schema::{self, SchemaError, ValidationContext};
use crate::services::climate::HaierClimate;
use crate::services::peripherals::{PeripheralRegistry, RemoteReceiver, RemoteTransmitter};
use crate::services::registry::{
    ClimateRegistry, ComponentRegistry, Entity as _, LifecycleError, RegistrationError, register_entity,
};
use crate::services::wiring::{self, WiringError};
use crate::utils::is_valid_identifier;
use core::fmt;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug)]
pub enum EntryError {
    Schema(SchemaError),
    Wiring(WiringError),
    Registration(RegistrationError),
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::Schema(e) => write!(f, "{}", e),
            EntryError::Wiring(e) => write!(f, "{}", e),
            EntryError::Registration(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EntryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EntryError::Schema(e) => Some(e),
            EntryError::Wiring(e) => Some(e),
            EntryError::Registration(e) => Some(e),
        }
    }
}

impl From<SchemaError> for EntryError {
    fn from(value: SchemaError) -> Self {
        EntryError::Schema(value)
    }
}

impl From<WiringError> for EntryError {
    fn from(value: WiringError) -> Self {
        EntryError::Wiring(value)
    }
}

impl From<RegistrationError> for EntryError {
    fn from(value: RegistrationError) -> Self {
        EntryError::Registration(value)
    }
}

#[derive(Debug)]
pub enum DocumentError {
    Io(std::io::Error),
    Parse(serde_path_to_error::Error<serde_json::Error>),
    MalformedPeripheralId(String),
    Peripheral(WiringError),
    /// Error in the `climate` entry at `index`.
    Entry { index: usize, source: EntryError },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Io(e) => write!(f, "read error: {}", e),
            DocumentError::Parse(e) => write!(f, "invalid document at '{}': {}", e.path(), e.inner()),
            DocumentError::MalformedPeripheralId(id) => write!(f, "peripheral id is not a valid identifier: \"{}\"", id),
            DocumentError::Peripheral(e) => write!(f, "{}", e),
            DocumentError::Entry { index, source } => write!(f, "climate[{}]: {}", index, source),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Io(e) => Some(e),
            DocumentError::Parse(e) => Some(e),
            DocumentError::Peripheral(e) => Some(e),
            DocumentError::Entry { source, .. } => Some(source),
            DocumentError::MalformedPeripheralId(_) => None,
        }
    }
}

pub fn parse_document(json: &str) -> Result<ConfigDocument, DocumentError> {
    let de = &mut serde_json::Deserializer::from_str(json);
    serde_path_to_error::deserialize(de).map_err(DocumentError::Parse)
}

pub fn read_document(path: &Path) -> Result<ConfigDocument, DocumentError> {
    let json = std::fs::read_to_string(path).map_err(DocumentError::Io)?;
    parse_document(&json)
}

fn check_peripheral_id(id: &PeripheralId) -> Result<(), DocumentError> {
    if is_valid_identifier(&id.0) {
        Ok(())
    } else {
        Err(DocumentError::MalformedPeripheralId(id.0.clone()))
    }
}

#[derive(Default)]
pub struct Application {
    peripherals: PeripheralRegistry,
    transmitters: BTreeMap<PeripheralId, Rc<RemoteTransmitter>>,
    receivers: BTreeMap<PeripheralId, Rc<RemoteReceiver>>,
    components: ComponentRegistry,
    climates: ClimateRegistry,
    entities: Vec<Rc<RefCell<HaierClimate>>>,
}

impl Application {
    /// Declare peripherals and bring every climate entry to `Registered`.
    ///
    /// Fails on the first invalid entry; nothing is set up.
    pub fn load(doc: ConfigDocument) -> Result<Self, DocumentError> {
        let mut app = Application::default();

        for cfg in doc.remote_transmitter {
            check_peripheral_id(&cfg.id)?;
            let id = cfg.id.clone();
            let handle = Rc::new(RemoteTransmitter::new(cfg));
            app.peripherals
                .declare_transmitter(id.clone(), handle.clone())
                .map_err(DocumentError::Peripheral)?;
            app.transmitters.insert(id, handle);
        }
        for cfg in doc.remote_receiver {
            check_peripheral_id(&cfg.id)?;
            let id = cfg.id.clone();
            let handle = Rc::new(RemoteReceiver::new(cfg));
            app.peripherals
                .declare_receiver(id.clone(), handle.clone())
                .map_err(DocumentError::Peripheral)?;
            app.receivers.insert(id, handle);
        }

        let explicit_ids = doc
            .climate
            .iter()
            .filter_map(|raw| raw.get("id")?.as_str().map(str::to_string));
        let mut ctx = ValidationContext::new(app.peripherals.transmitter_ids()).with_reserved_ids(explicit_ids);
        for (index, raw) in doc.climate.iter().enumerate() {
            app.load_entry(raw, &mut ctx)
                .map_err(|source| DocumentError::Entry { index, source })?;
        }

        info!(
            "Loaded {} climate entit{} ({} transmitter(s), {} receiver(s))",
            app.entities.len(),
            if app.entities.len() == 1 { "y" } else { "ies" },
            app.transmitters.len(),
            app.receivers.len()
        );
        Ok(app)
    }

    fn load_entry(&mut self, raw: &serde_json::Value, ctx: &mut ValidationContext) -> Result<(), EntryError> {
        let cfg = schema::validate_entry(raw, ctx)?;
        debug!("Validated climate {} ({})", cfg.id, cfg.platform);
        let entity = wiring::wire(cfg, &self.peripherals)?;
        register_entity(&entity, &mut self.components, &mut self.climates)?;
        self.entities.push(entity);
        Ok(())
    }

    /// Run `setup` on every registered component, making it `Active`.
    pub fn setup(&mut self) -> Result<(), LifecycleError> {
        self.components.setup_all()
    }

    pub fn loop_once(&mut self) -> usize {
        self.components.loop_all()
    }

    pub fn dump_config(&self) {
        self.components.dump_all();
    }

    pub fn climates(&self) -> &ClimateRegistry {
        &self.climates
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Rc<RefCell<HaierClimate>>> {
        self.entities.iter().find(|e| e.borrow().id() == id)
    }

    pub fn transmitter(&self, id: &PeripheralId) -> Option<&Rc<RemoteTransmitter>> {
        self.transmitters.get(id)
    }

    pub fn receiver(&self, id: &PeripheralId) -> Option<&Rc<RemoteReceiver>> {
        self.receivers.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::climate::{ClimateCall, ClimateMode};
    use crate::models::haier::{HaierAcState, HaierCommand, HaierMode, ModelSelector};
    use crate::services::registry::{Climate, Entity, LifecycleState};

    fn load_fixture(name: &str) -> ConfigDocument {
        let json = std::fs::read_to_string(format!("tests/data/{name}")).expect("fixture present");
        parse_document(&json).expect("parse fixture")
    }

    #[test]
    fn documented_scenario() {
        let doc = parse_document(
            r#"{
                "remote_transmitter": [{"id": "tx1", "pin": 4}],
                "climate": [{"platform": "haier", "id": "ac", "name": "AC", "model": "V9014557_B", "transmitter_id": "tx1"}]
            }"#,
        )
        .unwrap();
        let mut app = Application::load(doc).unwrap();

        let id = EntityId::from("ac");
        let entity = app.entity(&id).unwrap().clone();
        assert_eq!(entity.borrow().model(), ModelSelector::V9014557B);
        assert_eq!(entity.borrow().transmitter_id(), Some(&PeripheralId::from("tx1")));
        assert_eq!(entity.borrow().receiver_id(), None);
        assert_eq!(entity.borrow().lifecycle().state(), LifecycleState::Registered);
        assert_eq!((app.components().len(), app.climates().len()), (1, 1));
        assert!(app.climates().contains(&id));

        app.setup().unwrap();
        assert_eq!(entity.borrow().lifecycle().state(), LifecycleState::Active);
        assert_eq!(app.loop_once(), 1);
    }

    #[test]
    fn fixture_with_both_variants() {
        let mut app = Application::load(load_fixture("house.json")).unwrap();
        assert_eq!(app.climates().len(), 3);
        assert_eq!(
            app.climates().ids(),
            [
                EntityId::from("living_room"),
                EntityId::from("haier_climate_0"),
                EntityId::from("office")
            ]
        );

        let living = app.entity(&EntityId::from("living_room")).unwrap().clone();
        assert_eq!(living.borrow().receiver_id(), Some(&PeripheralId::from("ir_rx")));
        assert_eq!(app.receiver(&PeripheralId::from("ir_rx")).unwrap().listener_count(), 1);

        let bedroom = app.entity(&EntityId::from("haier_climate_0")).unwrap().clone();
        assert_eq!(bedroom.borrow().model(), ModelSelector::V9014557A);
        assert_eq!(bedroom.borrow().transmitter_id(), Some(&PeripheralId::from("ir_tx")));

        app.setup().unwrap();
        app.dump_config();

        // control through the climate registry reaches the shared transmitter
        let climate = app.climates().get(&EntityId::from("office")).unwrap();
        climate
            .borrow_mut()
            .control(&ClimateCall::new().with_mode(ClimateMode::Cool).with_target_temperature(21.0))
            .unwrap();
        let sent = app.transmitter(&PeripheralId::from("ir_tx")).unwrap().last_sent().unwrap();
        assert_eq!((sent.command, sent.mode, sent.temp_c), (HaierCommand::On, HaierMode::Cool, 21));

        // remote button press seen by the receiver updates the living room
        let mut frame = HaierAcState::new(ModelSelector::V9014557B);
        frame.command = HaierCommand::On;
        frame.mode = HaierMode::Heat;
        assert!(app.receiver(&PeripheralId::from("ir_rx")).unwrap().dispatch(&frame));
        assert_eq!(living.borrow().state().mode, ClimateMode::Heat);
    }

    #[test]
    fn entry_errors_carry_index() {
        let doc = parse_document(
            r#"{
                "remote_transmitter": [{"id": "tx1", "pin": 4}],
                "climate": [
                    {"platform": "haier", "name": "ok"},
                    {"platform": "haier_ir", "name": "bad", "model": "V9014557_B", "transmitter_id": "tx1"}
                ]
            }"#,
        )
        .unwrap();
        match Application::load(doc) {
            Err(DocumentError::Entry {
                index: 1,
                source: EntryError::Schema(SchemaError::Model(e)),
            }) => assert_eq!(e.token, "V9014557_B"),
            Err(other) => panic!("unexpected {other}"),
            Ok(_) => panic!("cross-variant model accepted"),
        }
    }

    #[test]
    fn undeclared_receiver_is_a_wiring_error() {
        let doc = parse_document(
            r#"{
                "remote_transmitter": [{"id": "tx1", "pin": 4}],
                "climate": [{"platform": "haier", "name": "x", "receiver_id": "rx1"}]
            }"#,
        )
        .unwrap();
        let err = Application::load(doc).err().expect("should fail");
        assert!(matches!(
            err,
            DocumentError::Entry {
                index: 0,
                source: EntryError::Wiring(WiringError::UndeclaredReceiver(_))
            }
        ));
        assert_eq!(err.to_string(), "climate[0]: receiver 'rx1' is not declared");
    }

    #[test]
    fn duplicate_entity_ids_rejected() {
        let doc = parse_document(
            r#"{
                "remote_transmitter": [{"id": "tx1", "pin": 4}],
                "climate": [
                    {"platform": "haier", "id": "ac", "name": "one"},
                    {"platform": "haier", "id": "ac", "name": "two"}
                ]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            Application::load(doc),
            Err(DocumentError::Entry {
                index: 1,
                source: EntryError::Registration(RegistrationError::Duplicate { .. })
            })
        ));
    }

    #[test]
    fn generated_id_avoids_later_explicit_id() {
        let doc = parse_document(
            r#"{
                "remote_transmitter": [{"id": "tx1", "pin": 4}],
                "climate": [
                    {"platform": "haier", "name": "hall"},
                    {"platform": "haier", "id": "haier_climate_0", "name": "kitchen"},
                    {"platform": "haier", "name": "attic"}
                ]
            }"#,
        )
        .unwrap();
        let app = Application::load(doc).unwrap();
        assert_eq!(
            app.climates().ids(),
            [
                EntityId::from("haier_climate_1"),
                EntityId::from("haier_climate_0"),
                EntityId::from("haier_climate_2")
            ]
        );
        assert_eq!(app.entity(&EntityId::from("haier_climate_0")).unwrap().borrow().name(), "kitchen");
    }

    #[test]
    fn inverted_visual_range_fails_load() {
        let doc = parse_document(
            r#"{
                "remote_transmitter": [{"id": "tx1", "pin": 4}],
                "climate": [{"platform": "haier", "name": "x", "visual": {"min_temperature": 30, "max_temperature": 16}}]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            Application::load(doc),
            Err(DocumentError::Entry {
                index: 0,
                source: EntryError::Schema(SchemaError::InvertedVisualRange { .. })
            })
        ));
    }

    #[test]
    fn document_level_errors() {
        let err = parse_document(r#"{"remote_transmitter": [{"id": "tx1", "pin": "four"}]}"#).unwrap_err();
        match &err {
            DocumentError::Parse(e) => assert_eq!(e.path().to_string(), "remote_transmitter[0].pin"),
            other => panic!("unexpected {other}"),
        }
        assert!(parse_document(r#"{"sensor": []}"#).is_err());

        let doc = parse_document(r#"{"remote_transmitter": [{"id": "tx 1", "pin": 4}]}"#).unwrap();
        assert!(matches!(Application::load(doc), Err(DocumentError::MalformedPeripheralId(_))));

        let doc = parse_document(
            r#"{"remote_transmitter": [{"id": "ir", "pin": 4}], "remote_receiver": [{"id": "ir", "pin": 5}]}"#,
        )
        .unwrap();
        assert!(matches!(
            Application::load(doc),
            Err(DocumentError::Peripheral(WiringError::DuplicatePeripheral(_)))
        ));

        assert!(matches!(
            read_document(Path::new("tests/data/missing.json")),
            Err(DocumentError::Io(_))
        ));
    }

    #[test]
    fn empty_document_loads() {
        let mut app = Application::load(parse_document("{}").unwrap()).unwrap();
        assert!(app.climates().is_empty());
        app.setup().unwrap();
        assert_eq!(app.loop_once(), 0);
    }
}
