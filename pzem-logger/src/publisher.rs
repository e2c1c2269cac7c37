//! Publishing meter readings and connection status on the bus.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bus::{BusValue, PublishSink};
use crate::decode::Variant;
use crate::reading::ReadingSet;

/// Consecutive failed polls tolerated before a device is marked disconnected.
pub const DISCONNECT_AFTER: u32 = 60;

/// Status code published for an inverter that is running.
const STATUS_RUNNING: i64 = 7;

/// Where a PV inverter is connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[serde(rename = "ac-input-1")]
    AcInput1 = 0,
    #[default]
    AcOutput = 1,
    #[serde(rename = "ac-input-2")]
    AcInput2 = 2,
}

impl Position {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Position::AcInput1),
            1 => Some(Position::AcOutput),
            2 => Some(Position::AcInput2),
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::AcInput1 => write!(f, "AC Input 1"),
            Position::AcOutput => write!(f, "AC Output"),
            Position::AcInput2 => write!(f, "AC Input 2"),
        }
    }
}

/// What a meter is published as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Grid,
    PvInverter { position: Position },
    Pzem016,
    DcMeter,
}

const AC_GRID_PATHS: &[(&str, &str)] = &[
    ("energy", "/Ac/Energy/Forward"),
    ("power", "/Ac/Power"),
    ("current", "/Ac/Current"),
    ("voltage", "/Ac/Voltage"),
    ("current", "/Ac/L1/Current"),
    ("energy", "/Ac/L1/Energy/Forward"),
    ("power", "/Ac/L1/Power"),
    ("voltage", "/Ac/L1/Voltage"),
    ("frequency", "/Ac/L1/Frequency"),
    ("pow_factor", "/Ac/L1/PowerFactor"),
];

const PZEM016_PATHS: &[(&str, &str)] = &[
    ("energy", "/Ac/TotalEnergy"),
    ("power", "/Ac/Power"),
    ("current", "/Ac/Current"),
    ("voltage", "/Ac/Voltage"),
    ("frequency", "/Ac/Frequency"),
    ("pow_factor", "/Ac/PowerFactor"),
];

const DC_METER_PATHS: &[(&str, &str)] = &[
    ("voltage", "/Dc/0/Voltage"),
    ("current", "/Dc/0/Current"),
    ("power", "/Dc/0/Power"),
    ("energy", "/Dc/0/Energy"),
    ("alarm_hiv", "/Alarms/HighVoltage"),
    ("alarm_lov", "/Alarms/LowVoltage"),
];

impl DeviceRole {
    /// Bus service name for the meter at `address` on serial device `device_name`.
    pub fn service_name(&self, device_name: &str, address: u8) -> String {
        match self {
            DeviceRole::Grid => format!("com.victronenergy.grid.pzem_{device_name}_{address}"),
            DeviceRole::PvInverter { .. } => {
                format!("com.victronenergy.pvinverter.pzem-{device_name}-{address}")
            }
            DeviceRole::Pzem016 => {
                format!("fr.mildred.pzemvictron2020.pzem016.{device_name}-{address}")
            }
            DeviceRole::DcMeter => {
                format!("com.victronenergy.dcsource.pzem_{device_name}_{address}")
            }
        }
    }

    /// Register layout the role's meter must have.
    pub fn variant(&self) -> Variant {
        match self {
            DeviceRole::DcMeter => Variant::Dc,
            _ => Variant::Ac,
        }
    }

    pub fn product_name(&self) -> &'static str {
        match self.variant() {
            Variant::Ac => "PZEM-016",
            Variant::Dc => "PZEM-017",
        }
    }

    /// Reading name to bus path. A reading may appear under several paths.
    pub fn paths(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            DeviceRole::Grid | DeviceRole::PvInverter { .. } => AC_GRID_PATHS,
            DeviceRole::Pzem016 => PZEM016_PATHS,
            DeviceRole::DcMeter => DC_METER_PATHS,
        }
    }

    /// Paths published once at registration besides management and readings.
    fn static_paths(&self) -> Vec<(&'static str, BusValue)> {
        match self {
            DeviceRole::Grid => vec![
                ("/Ac/Energy/Reverse", BusValue::Int(0)),
                ("/Ac/L1/Energy/Reverse", BusValue::Int(0)),
            ],
            DeviceRole::PvInverter { position } => vec![
                ("/Position", BusValue::Int(position.code())),
                ("/StatusCode", BusValue::Int(STATUS_RUNNING)),
            ],
            DeviceRole::Pzem016 | DeviceRole::DcMeter => Vec::new(),
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Grid => write!(f, "grid"),
            DeviceRole::PvInverter { position } => write!(f, "inverter ({position})"),
            DeviceRole::Pzem016 => write!(f, "pzem-016"),
            DeviceRole::DcMeter => write!(f, "dc-meter"),
        }
    }
}

/// Display text of a published value.
pub fn format_text(path: &str, value: &BusValue) -> String {
    let number = match value {
        BusValue::Text(text) => return text.clone(),
        BusValue::Invalid => return "--".to_string(),
        value => value.as_f64().unwrap_or(f64::NAN),
    };

    if path == "/Position" {
        if let Some(position) = Position::from_code(number as i64) {
            return position.to_string();
        }
    }

    match path.rsplit('/').next().unwrap_or(path) {
        "Forward" | "Reverse" | "TotalEnergy" | "Energy" => format!("{:.3}kWh", number / 1000.0),
        "Power" => format!("{number:.1}W"),
        "Current" => format!("{number:.3}A"),
        "Voltage" => format!("{number:.1}V"),
        "PowerFactor" => format!("{number:.2}"),
        "Frequency" => format!("{number:.1}Hz"),
        _ => format!("{number:.0}"),
    }
}

/// Publishes one meter's polls to its sink and tracks its connection state.
#[derive(Debug)]
pub struct DevicePublisher<S> {
    sink: S,
    role: DeviceRole,
    failures: u32,
    disconnect_after: u32,
    error_message: String,
}

impl<S: PublishSink> DevicePublisher<S> {
    /// Publish the management and initial paths of the meter at `address`.
    pub fn new(mut sink: S, role: DeviceRole, device_name: &str, address: u8) -> Self {
        let mut initial = vec![
            ("/Mgmt/ProcessName", BusValue::from(env!("CARGO_PKG_NAME"))),
            ("/Mgmt/ProcessVersion", BusValue::from(env!("CARGO_PKG_VERSION"))),
            (
                "/Mgmt/Connection",
                BusValue::from(format!("Device {address} on Modbus-RTU {device_name}")),
            ),
            ("/DeviceInstance", BusValue::Int(i64::from(address))),
            ("/ProductId", BusValue::Int(i64::from(address))),
            ("/ProductName", BusValue::from(role.product_name())),
            ("/FirmwareVersion", BusValue::Int(0)),
            ("/HardwareVersion", BusValue::Int(0)),
            ("/Connected", BusValue::Int(0)),
        ];
        initial.extend(role.paths().iter().map(|&(_, path)| (path, BusValue::Int(0))));
        initial.extend(role.static_paths());
        initial.extend([
            ("/DeviceType", BusValue::from(role.product_name())),
            ("/ErrorCode", BusValue::Int(0)),
            ("/ErrorMessage", BusValue::from("")),
        ]);
        for (path, value) in initial {
            sink.set(path, value);
        }

        Self {
            sink,
            role,
            failures: 0,
            disconnect_after: DISCONNECT_AFTER,
            error_message: String::new(),
        }
    }

    pub fn with_disconnect_after(mut self, disconnect_after: u32) -> Self {
        self.disconnect_after = disconnect_after;
        self
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Publish a successful poll and mark the device connected.
    pub fn record_success(&mut self, readings: &ReadingSet) {
        for &(name, path) in self.role.paths() {
            if let Some(value) = readings.get(name) {
                self.sink.set(path, value.into());
            }
        }
        self.sink.set("/ErrorCode", BusValue::Int(0));
        self.sink.set("/ErrorMessage", BusValue::from(""));
        self.sink.set("/Connected", BusValue::Int(1));
        self.failures = 0;
        self.error_message.clear();
    }

    /// Publish a failed poll. Readings keep their last values; after more
    /// than `disconnect_after` failures in a row the device is disconnected.
    pub fn record_failure(&mut self, error: &dyn fmt::Display) {
        self.error_message = error.to_string();
        self.failures = self.failures.saturating_add(1);
        self.sink.set("/ErrorCode", BusValue::Int(1));
        self.sink
            .set("/ErrorMessage", BusValue::from(self.error_message.as_str()));
        if self.failures > self.disconnect_after {
            self.sink.set("/Connected", BusValue::Int(0));
        }
    }

    /// Display text of `value` at `path`; the error code reads as the last error.
    pub fn text(&self, path: &str, value: &BusValue) -> String {
        if path == "/ErrorCode" {
            return self.error_message.clone();
        }
        format_text(path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ServiceHandle, ValueBus};
    use crate::reading::Value;

    fn ac_readings() -> ReadingSet {
        let mut readings = ReadingSet::with_capacity(7);
        readings.insert("voltage", Value::Float(230.0));
        readings.insert("current", Value::Float(0.5));
        readings.insert("power", Value::Float(150.0));
        readings.insert("energy", Value::Float(500.0));
        readings.insert("frequency", Value::Float(50.0));
        readings.insert("pow_factor", Value::Float(0.1));
        readings.insert("alarm_pow", Value::Bool(true));
        readings
    }

    fn publisher(bus: &ValueBus, role: DeviceRole) -> DevicePublisher<ServiceHandle> {
        let service = bus.register_service(&role.service_name("ttyUSB0", 20)).unwrap();
        DevicePublisher::new(service, role, "ttyUSB0", 20)
    }

    #[test]
    fn test_service_names() {
        assert_eq!(
            DeviceRole::Grid.service_name("ttyUSB0", 10),
            "com.victronenergy.grid.pzem_ttyUSB0_10"
        );
        assert_eq!(
            DeviceRole::PvInverter {
                position: Position::AcInput1
            }
            .service_name("ttyUSB0", 10),
            "com.victronenergy.pvinverter.pzem-ttyUSB0-10"
        );
        assert_eq!(
            DeviceRole::Pzem016.service_name("ttyUSB0", 20),
            "fr.mildred.pzemvictron2020.pzem016.ttyUSB0-20"
        );
        assert_eq!(DeviceRole::DcMeter.variant(), Variant::Dc);
    }

    #[test]
    fn test_registration_publishes_management_paths() {
        let bus = ValueBus::new();
        let publisher = publisher(
            &bus,
            DeviceRole::PvInverter {
                position: Position::AcOutput,
            },
        );
        let name = publisher.sink().name();

        assert_eq!(bus.get(name, "/Connected"), BusValue::Int(0));
        assert_eq!(bus.get(name, "/DeviceInstance"), BusValue::Int(20));
        assert_eq!(bus.get(name, "/ProductName"), BusValue::from("PZEM-016"));
        assert_eq!(bus.get(name, "/Position"), BusValue::Int(1));
        assert_eq!(bus.get(name, "/StatusCode"), BusValue::Int(7));
        assert_eq!(
            bus.get(name, "/Mgmt/Connection"),
            BusValue::from("Device 20 on Modbus-RTU ttyUSB0")
        );
    }

    #[test]
    fn test_success_publishes_mirrored_paths() {
        let bus = ValueBus::new();
        let mut publisher = publisher(&bus, DeviceRole::Grid);
        publisher.record_success(&ac_readings());
        let name = publisher.sink().name();

        assert_eq!(bus.get(name, "/Ac/Voltage"), BusValue::Float(230.0));
        assert_eq!(bus.get(name, "/Ac/L1/Voltage"), BusValue::Float(230.0));
        assert_eq!(bus.get(name, "/Ac/L1/Energy/Forward"), BusValue::Float(500.0));
        assert_eq!(bus.get(name, "/Ac/L1/PowerFactor"), BusValue::Float(0.1));
        assert_eq!(bus.get(name, "/Connected"), BusValue::Int(1));
        assert_eq!(bus.get(name, "/ErrorCode"), BusValue::Int(0));
    }

    #[test]
    fn test_failures_disconnect_after_threshold() {
        let bus = ValueBus::new();
        let mut publisher = publisher(&bus, DeviceRole::Pzem016);
        publisher.record_success(&ac_readings());
        let name = publisher.sink().name().to_string();

        for _ in 0..60 {
            publisher.record_failure(&"no response within 100ms");
        }
        assert_eq!(bus.get(&name, "/ErrorCode"), BusValue::Int(1));
        assert_eq!(
            bus.get(&name, "/ErrorMessage"),
            BusValue::from("no response within 100ms")
        );
        assert_eq!(bus.get(&name, "/Connected"), BusValue::Int(1));
        // Readings keep their last value.
        assert_eq!(bus.get(&name, "/Ac/Voltage"), BusValue::Float(230.0));

        publisher.record_failure(&"no response within 100ms");
        assert_eq!(publisher.consecutive_failures(), 61);
        assert_eq!(bus.get(&name, "/Connected"), BusValue::Int(0));

        publisher.record_success(&ac_readings());
        assert_eq!(publisher.consecutive_failures(), 0);
        assert_eq!(bus.get(&name, "/Connected"), BusValue::Int(1));
        assert_eq!(bus.get(&name, "/ErrorMessage"), BusValue::from(""));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let bus = ValueBus::new();
        let mut publisher = publisher(&bus, DeviceRole::Grid).with_disconnect_after(2);

        publisher.record_failure(&"timeout");
        publisher.record_failure(&"timeout");
        publisher.record_success(&ac_readings());
        publisher.record_failure(&"timeout");
        publisher.record_failure(&"timeout");

        assert_eq!(
            bus.get(publisher.sink().name(), "/Connected"),
            BusValue::Int(1)
        );
    }

    #[test]
    fn test_position_names() {
        let positions: Vec<Position> =
            serde_yml::from_str("[ac-input-1, ac-output, ac-input-2]").unwrap();
        assert_eq!(
            positions,
            vec![Position::AcInput1, Position::AcOutput, Position::AcInput2]
        );
        assert_eq!(
            serde_yml::to_string(&Position::AcInput2).unwrap().trim(),
            "ac-input-2"
        );
    }

    #[test]
    fn test_text_formatting() {
        assert_eq!(
            format_text("/Ac/Energy/Forward", &BusValue::Float(1234.0)),
            "1.234kWh"
        );
        assert_eq!(format_text("/Ac/L1/Power", &BusValue::Float(150.0)), "150.0W");
        assert_eq!(format_text("/Ac/Current", &BusValue::Float(0.5)), "0.500A");
        assert_eq!(format_text("/Ac/Voltage", &BusValue::Float(230.0)), "230.0V");
        assert_eq!(format_text("/Ac/PowerFactor", &BusValue::Float(0.1)), "0.10");
        assert_eq!(format_text("/Ac/Frequency", &BusValue::Float(50.0)), "50.0Hz");
        assert_eq!(format_text("/Position", &BusValue::Int(0)), "AC Input 1");
        assert_eq!(format_text("/DeviceInstance", &BusValue::Int(20)), "20");
        assert_eq!(format_text("/ProductName", &BusValue::from("PZEM-016")), "PZEM-016");

        let bus = ValueBus::new();
        let mut publisher = publisher(&bus, DeviceRole::Grid);
        publisher.record_failure(&"timeout");
        assert_eq!(publisher.text("/ErrorCode", &BusValue::Int(1)), "timeout");
    }
}
