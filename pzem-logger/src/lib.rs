//! Poll PZEM energy meters over Modbus RTU, publish their readings on an
//! object bus and record bus values into minute-slotted TeaFiles.
//!
//! ## Meters
//!
//! - [`decode::Layout`] fixes the register blocks and the scaling table of a
//!   meter family (`Ac` for PZEM-016, `Dc` for PZEM-017),
//! - [`instrument::Instrument`] reads and decodes them through a
//!   [`transport::RegisterTransport`], either a real serial line
//!   ([`transport::RtuBus`]) or the in-memory [`simulator::SimulatedBus`].
//!
//! ## Publishing
//!
//! [`polling::PollingService`] polls every meter each second and hands the
//! result to a [`publisher::DevicePublisher`], which maps readings to bus
//! paths and tracks the connected state.
//!
//! ## Recording
//!
//! [`recorder::Recorder`] writes the latest value of each tracked
//! [`metric::Metric`] into slot `n` of a [`teafile::TeaFile`], `n` being the
//! minutes elapsed since the epoch date kept in the file header. Missed slots
//! are backfilled with NaN. [`logger_service::LoggerService`] attaches a
//! recorder to every matching bus service.
//!
//! ## Derive macro
//!
//! `#[derive(Readings)]` implements [`reading::Readings`] for a struct of
//! decoded values. Fields **can** carry a `reading` attribute with optional
//! key-value pairs:
//! - `name` - reading name, defaults to the field name,
//! - `unit` - measurement unit,
//! - `decimals` - number of decimals kept when decoding.
//!
//! The `reading_doc` attribute documents each field from its `reading` attribute.

extern crate self as pzem_logger;

/// Register words and rounding
pub mod codec;
pub mod error;
/// Decoded values and their metadata
pub mod reading;
/// Register layouts and scaling of the meter families
pub mod decode;
/// Register transactions over a serial line
pub mod transport;
pub mod instrument;
/// In-memory meters for tests and demos
pub mod simulator;

pub mod bus;
pub mod publisher;
pub mod polling;

pub mod slot;
pub mod teafile;
pub mod metric;
pub mod recorder;
pub mod logger_service;

pub mod config;

pub mod derive {
    /// Re-export.
    pub use pzem_logger_derive::{reading_doc, Readings};
}
