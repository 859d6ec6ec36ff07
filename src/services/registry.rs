//! Host registries and the coarse entity lifecycle.
//!
//! The component registry drives `setup`/`loop`/`dump_config`; the climate
//! registry exposes entities to control surfaces. An entity enters each exactly
//! once, through `register_entity`.

use crate::models::climate::{ClimateCall, ClimateState, ClimateTraits};
use crate::models::haier::EntityId;
use crate::services::peripherals::TransmitError;
use core::fmt;
use log::{debug, info};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Unconfigured,
    Configured,
    Registered,
    Active,
}

impl LifecycleState {
    fn next(self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Unconfigured => Some(LifecycleState::Configured),
            LifecycleState::Configured => Some(LifecycleState::Registered),
            LifecycleState::Registered => Some(LifecycleState::Active),
            LifecycleState::Active => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleError {
    pub id: EntityId,
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}: illegal lifecycle transition {:?} -> {:?}", self.id, self.from, self.to)
    }
}

impl std::error::Error for LifecycleError {}

/// Forward-only lifecycle, one step at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle {
            state: LifecycleState::Unconfigured,
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn advance(&mut self, id: &EntityId, to: LifecycleState) -> Result<(), LifecycleError> {
        if self.state.next() != Some(to) {
            return Err(LifecycleError {
                id: id.clone(),
                from: self.state,
                to,
            });
        }
        debug!("Entity {}: {:?} -> {:?}", id, self.state, to);
        self.state = to;
        Ok(())
    }
}

pub trait Entity {
    fn id(&self) -> &EntityId;
    fn lifecycle(&self) -> &Lifecycle;
    fn lifecycle_mut(&mut self) -> &mut Lifecycle;
}

/// Periodically serviced object.
pub trait Component: Entity {
    /// Higher runs first.
    fn setup_priority(&self) -> f32;
    /// One-time setup; must leave the entity `Active`.
    fn setup(&mut self) -> Result<(), LifecycleError>;
    fn service(&mut self) {}
    fn dump_config(&self);
}

/// Controllable HVAC entity.
pub trait Climate: Entity {
    fn name(&self) -> &str;
    fn traits(&self) -> ClimateTraits;
    fn state(&self) -> ClimateState;
    fn control(&mut self, call: &ClimateCall) -> Result<(), TransmitError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Another entity already holds this id in the named registry.
    Duplicate { registry: &'static str, id: EntityId },
    Lifecycle(LifecycleError),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::Duplicate { registry, id } => {
                write!(f, "entity {} is already registered in the {} registry", id, registry)
            }
            RegistrationError::Lifecycle(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Lifecycle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LifecycleError> for RegistrationError {
    fn from(value: LifecycleError) -> Self {
        RegistrationError::Lifecycle(value)
    }
}

#[derive(Default)]
pub struct ComponentRegistry {
    components: Vec<Rc<RefCell<dyn Component>>>,
}

impl ComponentRegistry {
    pub fn contains(&self, id: &EntityId) -> bool {
        self.components.iter().any(|c| c.borrow().id() == id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn register(&mut self, component: Rc<RefCell<dyn Component>>) {
        self.components.push(component);
    }

    /// Run `setup` on every component, highest priority first.
    pub fn setup_all(&mut self) -> Result<(), LifecycleError> {
        let mut ordered = self.components.clone();
        ordered.sort_by(|a, b| b.borrow().setup_priority().total_cmp(&a.borrow().setup_priority()));
        for component in ordered {
            let mut c = component.borrow_mut();
            debug!("Setting up {} (priority {})", c.id(), c.setup_priority());
            c.setup()?;
        }
        info!("Set up {} component(s)", self.components.len());
        Ok(())
    }

    /// Service every active component once.
    pub fn loop_all(&mut self) -> usize {
        let mut serviced = 0;
        for component in &self.components {
            let mut c = component.borrow_mut();
            if c.lifecycle().state() == LifecycleState::Active {
                c.service();
                serviced += 1;
            }
        }
        serviced
    }

    pub fn dump_all(&self) {
        for component in &self.components {
            component.borrow().dump_config();
        }
    }
}

#[derive(Default)]
pub struct ClimateRegistry {
    climates: Vec<Rc<RefCell<dyn Climate>>>,
}

impl ClimateRegistry {
    pub fn contains(&self, id: &EntityId) -> bool {
        self.climates.iter().any(|c| c.borrow().id() == id)
    }

    pub fn len(&self) -> usize {
        self.climates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.climates.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<Rc<RefCell<dyn Climate>>> {
        self.climates.iter().find(|c| c.borrow().id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.climates.iter().map(|c| c.borrow().id().clone()).collect()
    }

    fn register(&mut self, climate: Rc<RefCell<dyn Climate>>) {
        self.climates.push(climate);
    }
}

/// Register a configured entity with both registries and mark it `Registered`.
///
/// Both registries are checked before either is touched, so a failure leaves
/// neither holding the entity.
pub fn register_entity<T>(
    entity: &Rc<RefCell<T>>,
    components: &mut ComponentRegistry,
    climates: &mut ClimateRegistry,
) -> Result<(), RegistrationError>
where
    T: Component + Climate + 'static,
{
    let id = entity.borrow().id().clone();
    let state = entity.borrow().lifecycle().state();
    if state != LifecycleState::Configured {
        return Err(RegistrationError::Lifecycle(LifecycleError {
            id,
            from: state,
            to: LifecycleState::Registered,
        }));
    }
    if components.contains(&id) {
        return Err(RegistrationError::Duplicate {
            registry: "component",
            id,
        });
    }
    if climates.contains(&id) {
        return Err(RegistrationError::Duplicate { registry: "climate", id });
    }

    components.register(entity.clone());
    climates.register(entity.clone());
    entity.borrow_mut().lifecycle_mut().advance(&id, LifecycleState::Registered)?;
    debug!("Registered entity {}", id);
    Ok(())
}
