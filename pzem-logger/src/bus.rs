//! In-process object bus for live values.
//!
//! Services register under a unique name and publish values at paths. Other
//! components subscribe to `(service, path)` pairs and always see the latest
//! value; the bus announces services appearing and vanishing so consumers can
//! attach to and detach from them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};

use crate::error::BusError;
use crate::reading::Value;

const EVENT_CAPACITY: usize = 64;

/// Value stored at a bus path.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Int(i64),
    Float(f64),
    Text(String),
    /// No value, e.g. the owning service is gone.
    Invalid,
}

impl BusValue {
    /// Numeric view; text and invalid values have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Int(value) => Some(*value as f64),
            BusValue::Float(value) => Some(*value),
            BusValue::Text(_) | BusValue::Invalid => None,
        }
    }
}

impl From<Value> for BusValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Float(value) => BusValue::Float(value),
            Value::Int(value) => BusValue::Int(value),
            Value::Bool(value) => BusValue::Int(i64::from(value)),
        }
    }
}

impl From<i64> for BusValue {
    fn from(value: i64) -> Self {
        BusValue::Int(value)
    }
}

impl From<f64> for BusValue {
    fn from(value: f64) -> Self {
        BusValue::Float(value)
    }
}

impl From<&str> for BusValue {
    fn from(value: &str) -> Self {
        BusValue::Text(value.to_string())
    }
}

impl From<String> for BusValue {
    fn from(value: String) -> Self {
        BusValue::Text(value)
    }
}

impl fmt::Display for BusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusValue::Int(value) => write!(f, "{value}"),
            BusValue::Float(value) => write!(f, "{value}"),
            BusValue::Text(value) => write!(f, "{value}"),
            BusValue::Invalid => write!(f, "--"),
        }
    }
}

/// Lifecycle of services on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    ServiceAppeared(String),
    ServiceVanished(String),
}

/// Latest value of one `(service, path)` pair, [`BusValue::Invalid`] until first published.
pub type Subscription = watch::Receiver<BusValue>;

/// Consumer of the values a device publishes.
pub trait PublishSink: Send {
    fn set(&mut self, path: &str, value: BusValue);
}

#[derive(Debug, Default)]
struct BusState {
    services: HashSet<String>,
    items: HashMap<(String, String), watch::Sender<BusValue>>,
}

impl BusState {
    fn item(&mut self, service: &str, path: &str) -> &watch::Sender<BusValue> {
        self.items
            .entry((service.to_string(), path.to_string()))
            .or_insert_with(|| watch::channel(BusValue::Invalid).0)
    }
}

/// Shared handle to the bus.
#[derive(Debug, Clone)]
pub struct ValueBus {
    state: Arc<Mutex<BusState>>,
    events: broadcast::Sender<BusEvent>,
}

impl Default for ValueBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueBus {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `name` on the bus. The service lives as long as the returned handle.
    pub fn register_service(&self, name: &str) -> Result<ServiceHandle, BusError> {
        if !self.state().services.insert(name.to_string()) {
            return Err(BusError::ServiceExists(name.to_string()));
        }
        log::debug!("service {name} registered");
        let _ = self.events.send(BusEvent::ServiceAppeared(name.to_string()));

        Ok(ServiceHandle {
            bus: self.clone(),
            name: name.to_string(),
            paths: Vec::new(),
        })
    }

    fn unregister_service(&self, name: &str, paths: &[String]) {
        {
            let mut state = self.state();
            if !state.services.remove(name) {
                return;
            }
            for path in paths {
                state.item(name, path).send_replace(BusValue::Invalid);
            }
        }
        log::debug!("service {name} unregistered");
        let _ = self.events.send(BusEvent::ServiceVanished(name.to_string()));
    }

    /// Follow the value at `path` of `service`, whether or not the service exists yet.
    pub fn subscribe(&self, service: &str, path: &str) -> Subscription {
        self.state().item(service, path).subscribe()
    }

    pub fn get(&self, service: &str, path: &str) -> BusValue {
        self.state().item(service, path).borrow().clone()
    }

    pub fn list_services(&self) -> Vec<String> {
        let mut services = self.state().services.iter().cloned().collect::<Vec<_>>();
        services.sort();
        services
    }

    pub fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }
}

/// A registered service. Dropping it removes the service from the bus.
#[derive(Debug)]
pub struct ServiceHandle {
    bus: ValueBus,
    name: String,
    paths: Vec<String>,
}

impl ServiceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare `path` with its initial value.
    pub fn add_path(&mut self, path: &str, initial: impl Into<BusValue>) {
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_string());
        }
        self.bus
            .state()
            .item(&self.name, path)
            .send_replace(initial.into());
    }

    pub fn get(&self, path: &str) -> BusValue {
        self.bus.get(&self.name, path)
    }

    /// Remove the service now instead of at drop.
    pub fn unregister(self) {}
}

impl PublishSink for ServiceHandle {
    fn set(&mut self, path: &str, value: BusValue) {
        self.add_path(path, value);
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.bus.unregister_service(&self.name, &self.paths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_sees_latest_value() {
        let bus = ValueBus::new();
        let sub = bus.subscribe("com.victronenergy.battery.ttyO1", "/History/ChargedEnergy");
        assert_eq!(*sub.borrow(), BusValue::Invalid);

        let mut service = bus.register_service("com.victronenergy.battery.ttyO1").unwrap();
        service.set("/History/ChargedEnergy", BusValue::Float(1.5));
        service.set("/History/ChargedEnergy", BusValue::Float(2.5));

        assert_eq!(*sub.borrow(), BusValue::Float(2.5));
    }

    #[test]
    fn test_service_name_is_unique() {
        let bus = ValueBus::new();
        let _first = bus.register_service("a").unwrap();

        assert_eq!(
            bus.register_service("a").unwrap_err(),
            BusError::ServiceExists("a".to_string())
        );
    }

    #[test]
    fn test_unregister_invalidates_values_and_announces() {
        let bus = ValueBus::new();
        let mut events = bus.events();
        let mut service = bus.register_service("svc").unwrap();
        service.add_path("/Connected", 1i64);
        assert_eq!(bus.list_services(), vec!["svc".to_string()]);

        service.unregister();

        assert!(bus.list_services().is_empty());
        assert_eq!(bus.get("svc", "/Connected"), BusValue::Invalid);
        assert_eq!(
            events.try_recv().unwrap(),
            BusEvent::ServiceAppeared("svc".to_string())
        );
        assert_eq!(
            events.try_recv().unwrap(),
            BusEvent::ServiceVanished("svc".to_string())
        );
        // The name can be claimed again.
        assert!(bus.register_service("svc").is_ok());
    }

    #[test]
    fn test_bus_value_conversions() {
        assert_eq!(BusValue::from(Value::Bool(true)), BusValue::Int(1));
        assert_eq!(BusValue::from("x").as_f64(), None);
        assert_eq!(BusValue::Int(3).as_f64(), Some(3.0));
    }
}
