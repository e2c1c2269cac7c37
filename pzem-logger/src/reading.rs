//! Named physical quantities produced by one poll.

use std::fmt;

use crate::decode::CurrentRange;

/// Value of a single reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// Numeric view of the value; booleans map to 0 and 1.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Float(value) => value,
            Value::Int(value) => value as f64,
            Value::Bool(value) => f64::from(u8::from(value)),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<CurrentRange> for Value {
    fn from(value: CurrentRange) -> Self {
        Value::Float(value.amps())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Static description of one reading of a [`Readings`] type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingField {
    pub name: &'static str,
    pub unit: &'static str,
    /// Decimal places kept by [`Readings::round`].
    pub decimals: Option<u8>,
}

/// Ordered mapping from reading name to value, produced fresh on every poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingSet(Vec<(&'static str, Value)>);

impl ReadingSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Append a reading. Names are unique within a set; a repeated name replaces the value in place.
    pub fn insert(&mut self, name: &'static str, value: Value) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Value)> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|(n, _)| *n).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReadingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Conversion of a decoded register struct into its [`ReadingSet`].
///
/// Usually implemented with `#[derive(Readings)]`.
pub trait Readings {
    const FIELDS: &'static [ReadingField];

    fn reading_set(&self) -> ReadingSet;

    /// Round every field that declares decimals in [`Readings::FIELDS`].
    fn round(&mut self);

    /// Copy with [`Readings::round`] applied.
    fn rounded(mut self) -> Self
    where
        Self: Sized,
    {
        self.round();
        self
    }

    /// Unit of the reading called `name`.
    fn unit(name: &str) -> Option<&'static str> {
        Self::FIELDS
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.unit)
    }
}

/// One `name: value unit` line per reading.
pub fn describe<R: Readings>(readings: &R) -> String {
    readings
        .reading_set()
        .iter()
        .map(|(name, value)| match R::unit(name) {
            Some(unit) if !unit.is_empty() => format!("{name}: {value} {unit}"),
            _ => format!("{name}: {value}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
