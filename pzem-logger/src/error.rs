//! Error types, one enum per concern.

use std::time::Duration;

use crate::codec::Word;

/// A single register transaction failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("device answered with exception: {0}")]
    Exception(tokio_modbus::Exception),
    #[error("modbus transaction failed: {0}")]
    Modbus(#[from] tokio_modbus::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("function code {0:#04x} is not supported for this transaction")]
    UnsupportedFunction(u8),
}

impl From<tokio_modbus::Exception> for TransportError {
    fn from(value: tokio_modbus::Exception) -> Self {
        Self::Exception(value)
    }
}

/// Raw register words could not be turned into a reading set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected} registers, got {actual}")]
    WordCount { expected: usize, actual: usize },
    #[error("undefined current range code {0:#06x}")]
    CurrentRange(Word),
    #[error("unknown meter type `{0}`, use `ac` or `dc`")]
    Variant(String),
}

/// Failure of an instrument call, either on the wire or while decoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("register transaction failed: {0}")]
    Transport(#[from] TransportError),
    #[error("register decoding failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Series file failures. These are fatal to a recorder.
#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("series file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("byte order mark mismatch: {0:#018x}")]
    ByteOrderMark(u64),
    #[error("header declares {header} bytes but the file holds {file}")]
    HeaderSize { header: u64, file: u64 },
    #[error("unknown header section id {0:#x}")]
    UnknownSection(i32),
    #[error("section {id:#x} read {read} bytes but declares {declared}")]
    SectionOverrun { id: i32, read: u64, declared: u64 },
    #[error("invalid field type {0}")]
    FieldType(i32),
    #[error("invalid name value kind {0}")]
    NameValueKind(i32),
    #[error("no field at offset {0}")]
    FieldOffset(i32),
    #[error("header text is not valid UTF-8")]
    Text(#[from] std::string::FromUtf8Error),
    #[error("file has no item description")]
    MissingItemDescription,
    #[error("an item needs at least one field")]
    NoFields,
    #[error("invalid field format character `{0}`")]
    FormatChar(char),
    #[error("item has {actual} values but the file declares {expected} fields")]
    ValueCount { expected: usize, actual: usize },
    #[error("value for field `{0}` does not match its declared type")]
    ValueType(String),
    #[error("file fields {found:?} do not match declared metrics {declared:?}")]
    SchemaMismatch {
        declared: Vec<String>,
        found: Vec<String>,
    },
    #[error("start date is missing or invalid in the file header")]
    StartDate,
    #[error("recorder task ended abnormally: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Object bus failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("service `{0}` is already registered")]
    ServiceExists(String),
}

/// Configuration loading and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
