use std::marker::PhantomData;

use async_trait::async_trait;

use crate::decode::{Ac, Dc, Layout, Variant, ADDRESS_REGISTER};
use crate::error::Error;
use crate::reading::{ReadingSet, Readings};
use crate::transport::{FunctionCode, RegisterTransport};

/// One meter on the field bus: its transport, address and register layout.
///
/// The layout is fixed by the type; a meter of the other family needs a new `Instrument`.
pub struct Instrument<T, L> {
    transport: T,
    address: u8,
    layout: PhantomData<L>,
}

impl<T, L> Instrument<T, L>
where
    T: RegisterTransport,
    L: Layout,
{
    pub fn new(transport: T, address: u8) -> Self {
        Self {
            transport,
            address,
            layout: PhantomData,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn variant(&self) -> Variant {
        L::VARIANT
    }

    /// Read and decode the measurement registers.
    pub async fn readings(&mut self) -> Result<L::Readings, Error> {
        let block = L::READINGS;
        let words = self
            .transport
            .read_registers(block.start, block.count, block.function)
            .await?;
        Ok(L::decode_readings(&words)?)
    }

    /// Read and decode the configuration registers.
    pub async fn device_info(&mut self) -> Result<L::DeviceInfo, Error> {
        let block = L::DEVICE_INFO;
        let words = self
            .transport
            .read_registers(block.start, block.count, block.function)
            .await?;
        Ok(L::decode_device_info(&words)?)
    }

    /// Write a new device address and return the instrument bound to it.
    ///
    /// The old instrument is consumed.
    pub async fn change_address(mut self, address: u8) -> Result<Self, Error> {
        self.transport
            .write_register(
                ADDRESS_REGISTER,
                u16::from(address),
                FunctionCode::WriteSingleRegister,
            )
            .await?;
        log::info!("meter {} now answers at address {}", self.address, address);

        Ok(Self {
            transport: self.transport.rebind(address),
            address,
            layout: PhantomData,
        })
    }
}

/// Object-safe view of an [`Instrument`] for services polling meters of both families.
#[async_trait]
pub trait Meter: Send {
    fn address(&self) -> u8;

    fn variant(&self) -> Variant;

    async fn poll_readings(&mut self) -> Result<ReadingSet, Error>;

    async fn poll_device_info(&mut self) -> Result<ReadingSet, Error>;
}

#[async_trait]
impl<T, L> Meter for Instrument<T, L>
where
    T: RegisterTransport,
    L: Layout,
{
    fn address(&self) -> u8 {
        self.address
    }

    fn variant(&self) -> Variant {
        L::VARIANT
    }

    async fn poll_readings(&mut self) -> Result<ReadingSet, Error> {
        Ok(self.readings().await?.reading_set())
    }

    async fn poll_device_info(&mut self) -> Result<ReadingSet, Error> {
        Ok(self.device_info().await?.reading_set())
    }
}

/// Build a boxed [`Meter`] for `variant`. The variant is resolved here, once.
pub fn meter<T>(transport: T, address: u8, variant: Variant) -> Box<dyn Meter>
where
    T: RegisterTransport + 'static,
{
    match variant {
        Variant::Ac => Box::new(Instrument::<T, Ac>::new(transport, address)),
        Variant::Dc => Box::new(Instrument::<T, Dc>::new(transport, address)),
    }
}
