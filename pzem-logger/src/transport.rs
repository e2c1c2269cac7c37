use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_modbus::client::{rtu, Context, Reader, Writer};
use tokio_modbus::slave::{Slave, SlaveContext};
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};

use crate::codec::{Address, Quantity, Word};
use crate::error::TransportError;

/// Modbus function codes used by the meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleRegister = 0x06,
}

/// Register transaction primitive of one device on the field bus.
///
/// Framing, addressing and checksums belong to the implementation; a failed
/// transaction is reported once and never retried here.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` consecutive registers starting at `start` with the given read function.
    async fn read_registers(
        &mut self,
        start: Address,
        count: Quantity,
        function: FunctionCode,
    ) -> Result<Vec<Word>, TransportError>;

    /// Write one register with the given write function.
    async fn write_register(
        &mut self,
        offset: Address,
        value: Word,
        function: FunctionCode,
    ) -> Result<(), TransportError>;

    /// The same line, bound to another device address.
    fn rebind(self, address: u8) -> Self
    where
        Self: Sized;
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
    pub stop_bits: u8,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            stop_bits: 2,
            timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One opened serial port shared by every meter on the line.
#[derive(Clone)]
pub struct RtuBus {
    ctx: Arc<Mutex<Context>>,
    timeout: Duration,
}

impl RtuBus {
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let stop_bits = if config.stop_bits == 1 {
            StopBits::One
        } else {
            StopBits::Two
        };
        let builder = tokio_serial::new(&config.device, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(stop_bits)
            .timeout(config.timeout());
        let serial_stream = SerialStream::open(&builder)?;
        let ctx = rtu::attach(serial_stream);
        log::debug!(
            "opened {} at {} baud, {} stop bits",
            config.device,
            config.baud_rate,
            config.stop_bits
        );

        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
            timeout: config.timeout(),
        })
    }

    /// Transport for the meter at `address`.
    pub fn device(&self, address: u8) -> RtuTransport {
        RtuTransport {
            bus: self.clone(),
            slave: Slave(address),
        }
    }
}

/// [`RegisterTransport`] of one meter on an [`RtuBus`].
pub struct RtuTransport {
    bus: RtuBus,
    slave: Slave,
}

#[async_trait]
impl RegisterTransport for RtuTransport {
    async fn read_registers(
        &mut self,
        start: Address,
        count: Quantity,
        function: FunctionCode,
    ) -> Result<Vec<Word>, TransportError> {
        let timeout = self.bus.timeout;
        let mut ctx = self.bus.ctx.lock().await;
        ctx.set_slave(self.slave);
        let response = match function {
            FunctionCode::ReadInputRegisters => {
                tokio::time::timeout(timeout, ctx.read_input_registers(start, count)).await
            }
            FunctionCode::ReadHoldingRegisters => {
                tokio::time::timeout(timeout, ctx.read_holding_registers(start, count)).await
            }
            other => return Err(TransportError::UnsupportedFunction(other as u8)),
        };
        let words = response.map_err(|_| TransportError::Timeout(timeout))???;

        Ok(words)
    }

    async fn write_register(
        &mut self,
        offset: Address,
        value: Word,
        function: FunctionCode,
    ) -> Result<(), TransportError> {
        if function != FunctionCode::WriteSingleRegister {
            return Err(TransportError::UnsupportedFunction(function as u8));
        }
        let timeout = self.bus.timeout;
        let mut ctx = self.bus.ctx.lock().await;
        ctx.set_slave(self.slave);
        tokio::time::timeout(timeout, ctx.write_single_register(offset, value))
            .await
            .map_err(|_| TransportError::Timeout(timeout))???;

        Ok(())
    }

    fn rebind(self, address: u8) -> Self {
        Self {
            bus: self.bus,
            slave: Slave(address),
        }
    }
}
