//! Register layouts and scaling tables of the PZEM AC and DC meters.
//!
//! Every reading is computed in `f64` exactly as the device documentation
//! prescribes, then rounded to the decimals its `reading` attribute declares
//! (see [`Readings::round`]). Two oddities are part of the
//! device contract and kept as is:
//!
//! - 32-bit values are assembled `high × 65536 + low × scale` for the AC meter,
//!   but `first × 65536 + second × scale` for the DC meter, so only the lower
//!   word is scaled.
//! - the AC power factor is scaled by 0.01 and then rounded to one decimal.

use std::fmt;
use std::str::FromStr;

use pzem_logger_derive::{reading_doc, Readings};
use serde::{Deserialize, Serialize};

use crate::codec::{Address, Quantity, Word};
use crate::error::DecodeError;
use crate::reading::Readings;
use crate::transport::FunctionCode;

/// Holding register with the device address, written with [`FunctionCode::WriteSingleRegister`].
pub const ADDRESS_REGISTER: Address = 0x0002;

/// Address every meter answers regardless of its configured one.
pub const GENERAL_ADDRESS: u8 = 0xF8;

/// Meter family, fixing the register layout and scaling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Ac,
    Dc,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Ac => write!(f, "ac"),
            Variant::Dc => write!(f, "dc"),
        }
    }
}

impl FromStr for Variant {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ac" => Ok(Variant::Ac),
            "dc" => Ok(Variant::Dc),
            other => Err(DecodeError::Variant(other.to_string())),
        }
    }
}

/// Consecutive registers read in one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    pub start: Address,
    pub count: Quantity,
    pub function: FunctionCode,
}

/// Register layout of one meter family.
pub trait Layout: Send + Sync + 'static {
    const VARIANT: Variant;
    const READINGS: RegisterBlock;
    const DEVICE_INFO: RegisterBlock;

    type Readings: Readings + fmt::Debug + Send;
    type DeviceInfo: Readings + fmt::Debug + Send;

    fn decode_readings(words: &[Word]) -> Result<Self::Readings, DecodeError>;
    fn decode_device_info(words: &[Word]) -> Result<Self::DeviceInfo, DecodeError>;
}

/// Measurement current range of the DC meter shunt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentRange {
    A100,
    A50,
    A200,
    A300,
}

impl CurrentRange {
    pub fn from_code(code: Word) -> Result<Self, DecodeError> {
        match code {
            0x0000 => Ok(CurrentRange::A100),
            0x0001 => Ok(CurrentRange::A50),
            0x0002 => Ok(CurrentRange::A200),
            0x0003 => Ok(CurrentRange::A300),
            other => Err(DecodeError::CurrentRange(other)),
        }
    }

    pub fn amps(&self) -> f64 {
        match self {
            CurrentRange::A100 => 100.0,
            CurrentRange::A50 => 50.0,
            CurrentRange::A200 => 200.0,
            CurrentRange::A300 => 300.0,
        }
    }
}

fn check_len<const N: usize>(words: &[Word]) -> Result<&[Word; N], DecodeError> {
    words.try_into().map_err(|_| DecodeError::WordCount {
        expected: N,
        actual: words.len(),
    })
}

fn w(word: Word) -> f64 {
    f64::from(word)
}

#[reading_doc]
#[derive(Debug, Clone, Copy, PartialEq, Readings)]
pub struct AcReadings {
    #[reading(unit = "V", decimals = 1)]
    pub voltage: f64,
    #[reading(unit = "A", decimals = 3)]
    pub current: f64,
    #[reading(unit = "W", decimals = 1)]
    pub power: f64,
    #[reading(unit = "Wh", decimals = 0)]
    pub energy: f64,
    #[reading(unit = "Hz", decimals = 1)]
    pub frequency: f64,
    #[reading(decimals = 1)]
    pub pow_factor: f64,
    pub alarm_pow: bool,
}

#[reading_doc]
#[derive(Debug, Clone, Copy, PartialEq, Readings)]
pub struct AcDeviceInfo {
    #[reading(unit = "W", decimals = 1)]
    pub alarm_pow: f64,
    pub address: u16,
}

#[reading_doc]
#[derive(Debug, Clone, Copy, PartialEq, Readings)]
pub struct DcReadings {
    #[reading(unit = "V", decimals = 1)]
    pub voltage: f64,
    #[reading(unit = "A", decimals = 3)]
    pub current: f64,
    #[reading(unit = "W", decimals = 1)]
    pub power: f64,
    #[reading(unit = "Wh", decimals = 0)]
    pub energy: f64,
    pub alarm_hiv: bool,
    pub alarm_lov: bool,
}

#[reading_doc]
#[derive(Debug, Clone, Copy, PartialEq, Readings)]
pub struct DcDeviceInfo {
    #[reading(unit = "V", decimals = 1)]
    pub alarm_hiv: f64,
    #[reading(unit = "V", decimals = 1)]
    pub alarm_lov: f64,
    pub address: u16,
    #[reading(unit = "A")]
    pub cur_range: CurrentRange,
}

/// PZEM-004T/016 AC meter.
#[derive(Debug, Clone, Copy)]
pub struct Ac;

/// PZEM-003/017 DC meter.
#[derive(Debug, Clone, Copy)]
pub struct Dc;

impl Layout for Ac {
    const VARIANT: Variant = Variant::Ac;
    const READINGS: RegisterBlock = RegisterBlock {
        start: 0x0000,
        count: 10,
        function: FunctionCode::ReadInputRegisters,
    };
    const DEVICE_INFO: RegisterBlock = RegisterBlock {
        start: 0x0001,
        count: 2,
        function: FunctionCode::ReadHoldingRegisters,
    };

    type Readings = AcReadings;
    type DeviceInfo = AcDeviceInfo;

    fn decode_readings(words: &[Word]) -> Result<AcReadings, DecodeError> {
        let d = check_len::<10>(words)?;
        Ok(AcReadings {
            voltage: w(d[0]) * 0.1,
            current: w(d[2]) * 65536.0 + w(d[1]) * 0.001,
            power: w(d[4]) * 65536.0 + w(d[3]) * 0.1,
            energy: w(d[6]) * 65536.0 + w(d[5]),
            frequency: w(d[7]) * 0.1,
            pow_factor: w(d[8]) * 0.01,
            alarm_pow: d[9] != 0,
        }
        .rounded())
    }

    fn decode_device_info(words: &[Word]) -> Result<AcDeviceInfo, DecodeError> {
        let d = check_len::<2>(words)?;
        Ok(AcDeviceInfo {
            alarm_pow: w(d[0]),
            address: d[1],
        }
        .rounded())
    }
}

impl Layout for Dc {
    const VARIANT: Variant = Variant::Dc;
    const READINGS: RegisterBlock = RegisterBlock {
        start: 0x0000,
        count: 8,
        function: FunctionCode::ReadInputRegisters,
    };
    const DEVICE_INFO: RegisterBlock = RegisterBlock {
        start: 0x0000,
        count: 4,
        function: FunctionCode::ReadHoldingRegisters,
    };

    type Readings = DcReadings;
    type DeviceInfo = DcDeviceInfo;

    fn decode_readings(words: &[Word]) -> Result<DcReadings, DecodeError> {
        let d = check_len::<8>(words)?;
        Ok(DcReadings {
            voltage: w(d[0]) * 0.01,
            current: w(d[1]) * 65536.0 + w(d[2]) * 0.01,
            power: w(d[3]) * 65536.0 + w(d[4]) * 0.1,
            energy: w(d[5]) * 65536.0 + w(d[6]),
            // Same word as the low half of energy.
            alarm_hiv: d[6] != 0,
            alarm_lov: d[7] != 0,
        }
        .rounded())
    }

    fn decode_device_info(words: &[Word]) -> Result<DcDeviceInfo, DecodeError> {
        let d = check_len::<4>(words)?;
        Ok(DcDeviceInfo {
            alarm_hiv: w(d[0]) * 0.01,
            alarm_lov: w(d[1]) * 0.01,
            address: d[2],
            cur_range: CurrentRange::from_code(d[3])?,
        }
        .rounded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Value;

    #[test]
    fn test_ac_readings() {
        let words = [2300, 500, 0, 1500, 0, 0, 0, 500, 10, 1];
        let r = Ac::decode_readings(&words).unwrap();

        assert_eq!(r.voltage, 230.0);
        assert_eq!(r.current, 0.5);
        assert_eq!(r.power, 150.0);
        assert_eq!(r.energy, 0.0);
        assert_eq!(r.frequency, 50.0);
        assert_eq!(r.pow_factor, 0.1);
        assert!(r.alarm_pow);
    }

    #[test]
    fn test_ac_high_word_is_second() {
        // current: high word 1, low word 2000 -> 65536 + 2.0
        let words = [0, 2000, 1, 3, 2, 5, 1, 0, 0, 0];
        let r = Ac::decode_readings(&words).unwrap();

        assert_eq!(r.current, 65538.0);
        assert_eq!(r.power, 131072.3);
        assert_eq!(r.energy, 65541.0);
        assert!(!r.alarm_pow);
    }

    #[test]
    fn test_ac_pow_factor_keeps_one_decimal() {
        let mut words = [0; 10];
        words[8] = 97;
        assert_eq!(Ac::decode_readings(&words).unwrap().pow_factor, 1.0);
        words[8] = 84;
        assert_eq!(Ac::decode_readings(&words).unwrap().pow_factor, 0.8);
        words[8] = 86;
        assert_eq!(Ac::decode_readings(&words).unwrap().pow_factor, 0.9);
    }

    #[test]
    fn test_rounding_follows_declared_decimals() {
        let raw = AcReadings {
            voltage: 230.04,
            current: 0.12345,
            power: 99.96,
            energy: 12.5,
            frequency: 49.96,
            pow_factor: 0.86,
            alarm_pow: true,
        };
        let r = raw.rounded();

        assert_eq!(r.voltage, 230.0);
        assert_eq!(r.current, 0.123);
        assert_eq!(r.power, 100.0);
        assert_eq!(r.energy, 13.0);
        assert_eq!(r.frequency, 50.0);
        assert_eq!(r.pow_factor, 0.9);
        assert!(r.alarm_pow);
    }

    #[test]
    fn test_ac_rejects_short_input() {
        let words = [2300, 500, 0, 1500, 0, 0, 1, 500, 10];
        assert_eq!(
            Ac::decode_readings(&words),
            Err(DecodeError::WordCount {
                expected: 10,
                actual: 9
            })
        );
    }

    #[test]
    fn test_ac_reading_set_order() {
        let words = [2300, 500, 0, 1500, 0, 0, 0, 500, 10, 1];
        let set = Ac::decode_readings(&words).unwrap().reading_set();

        assert_eq!(
            set.names(),
            vec![
                "voltage",
                "current",
                "power",
                "energy",
                "frequency",
                "pow_factor",
                "alarm_pow"
            ]
        );
        assert_eq!(set.get("alarm_pow"), Some(Value::Bool(true)));
        assert_eq!(AcReadings::FIELDS[1].unit, "A");
        assert_eq!(AcReadings::FIELDS[1].decimals, Some(3));
    }

    #[test]
    fn test_ac_device_info() {
        let info = Ac::decode_device_info(&[2300, 20]).unwrap();
        assert_eq!(info.alarm_pow, 2300.0);
        assert_eq!(info.address, 20);
        assert_eq!(info.reading_set().get("address"), Some(Value::Int(20)));
    }

    #[test]
    fn test_describe_with_units() {
        let readings = Ac::decode_readings(&[2300, 500, 0, 1500, 0, 0, 0, 500, 10, 1]).unwrap();
        let text = crate::reading::describe(&readings);
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "voltage: 230 V");
        assert_eq!(lines[1], "current: 0.5 A");
        assert_eq!(lines[5], "pow_factor: 0.1");
        assert_eq!(lines[6], "alarm_pow: true");
    }

    #[test]
    fn test_dc_readings() {
        // voltage 12.34 V, current 1*65536 + 250*0.01, power 0*65536 + 301*0.1
        let words = [1234, 1, 250, 0, 301, 0, 42, 0];
        let r = Dc::decode_readings(&words).unwrap();

        assert_eq!(r.voltage, 12.3);
        assert_eq!(r.current, 65538.5);
        assert_eq!(r.power, 30.1);
        assert_eq!(r.energy, 42.0);
        assert!(r.alarm_hiv);
        assert!(!r.alarm_lov);
    }

    #[test]
    fn test_dc_alarm_hiv_shares_energy_word() {
        let words = [0, 0, 0, 0, 0, 3, 0, 1];
        let r = Dc::decode_readings(&words).unwrap();

        assert_eq!(r.energy, 3.0 * 65536.0);
        assert!(!r.alarm_hiv);
        assert!(r.alarm_lov);
    }

    #[test]
    fn test_dc_device_info() {
        let info = Dc::decode_device_info(&[3000, 700, 1, 3]).unwrap();
        assert_eq!(info.alarm_hiv, 30.0);
        assert_eq!(info.alarm_lov, 7.0);
        assert_eq!(info.address, 1);
        assert_eq!(info.cur_range, CurrentRange::A300);
        assert_eq!(info.reading_set().get("cur_range"), Some(Value::Float(300.0)));
    }

    #[test]
    fn test_dc_device_info_undefined_range() {
        assert_eq!(
            Dc::decode_device_info(&[3000, 700, 1, 4]),
            Err(DecodeError::CurrentRange(4))
        );
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("AC".parse::<Variant>(), Ok(Variant::Ac));
        assert_eq!("dc".parse::<Variant>(), Ok(Variant::Dc));
        assert_eq!(
            "xx".parse::<Variant>(),
            Err(DecodeError::Variant("xx".to_string()))
        );
    }
}
