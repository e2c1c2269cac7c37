use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;

use crate::codec::{Address, Quantity, Word};
use crate::decode::ADDRESS_REGISTER;
use crate::error::TransportError;
use crate::transport::{FunctionCode, RegisterTransport};

/// Reported by reads to an address where no meter answers.
const NO_RESPONSE: Duration = Duration::from_millis(100);

/// A raw Modbus input or holding register bank.
#[derive(Debug, Clone, Default)]
pub struct Registers(HashMap<Address, Word>);

impl Registers {
    /// Insert new consecutive registers with `words` values starting at `addr` address.
    pub fn insert(&mut self, addr: Address, words: &[Word]) {
        for (i, value) in words.iter().enumerate() {
            let reg_addr = addr + i as Address;
            self.0.insert(reg_addr, *value);
        }
    }

    /// Read `cnt` consecutive registers starting at `addr`.
    pub fn read(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>, TransportError> {
        let mut response_values = vec![0; cnt.into()];
        for i in 0..cnt {
            let reg_addr = addr + i;
            match self.0.get(&reg_addr) {
                Some(r) => response_values[i as usize] = *r,
                None => {
                    return Err(TransportError::Exception(
                        tokio_modbus::Exception::IllegalDataAddress,
                    ))
                }
            }
        }

        Ok(response_values)
    }

    /// Write `value` into an existing register at `addr`.
    pub fn write(&mut self, addr: Address, value: Word) -> Result<(), TransportError> {
        match self.0.get_mut(&addr) {
            Some(r) => {
                *r = value;
                Ok(())
            }
            None => Err(TransportError::Exception(
                tokio_modbus::Exception::IllegalDataAddress,
            )),
        }
    }
}

/// Register banks of one simulated PZEM meter.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMeter {
    pub input_registers: Registers,
    pub holding_registers: Registers,
}

impl SimulatedMeter {
    /// AC meter with raw measurement words and the power alarm threshold in W.
    pub fn ac(input: [Word; 10], alarm_pow: Word) -> Self {
        let mut meter = Self::default();
        meter.input_registers.insert(0x0000, &input);
        meter.holding_registers.insert(0x0001, &[alarm_pow, 0]);
        meter
    }

    /// DC meter with raw measurement words and `[alarm_hiv, alarm_lov, cur_range]` holding words.
    pub fn dc(input: [Word; 8], holding: [Word; 3]) -> Self {
        let mut meter = Self::default();
        meter.input_registers.insert(0x0000, &input);
        meter
            .holding_registers
            .insert(0x0000, &[holding[0], holding[1], 0, holding[2]]);
        meter
    }

    pub fn set_input(&mut self, addr: Address, value: Word) {
        self.input_registers.insert(addr, &[value]);
    }

    pub fn set_holding(&mut self, addr: Address, value: Word) {
        self.holding_registers.insert(addr, &[value]);
    }
}

#[derive(Debug, Default)]
struct BusState {
    meters: HashMap<u8, SimulatedMeter>,
    failures: HashMap<u8, u32>,
}

/// In-process field bus with simulated meters, keyed by device address.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus(Arc<Mutex<BusState>>);

impl SimulatedBus {
    fn state(&self) -> MutexGuard<'_, BusState> {
        // A panicking test thread must not hide the bus from the others.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Plug `meter` in at `address`; its address register is set accordingly.
    pub fn attach(&self, address: u8, mut meter: SimulatedMeter) {
        meter.set_holding(ADDRESS_REGISTER, u16::from(address));
        self.state().meters.insert(address, meter);
    }

    pub fn detach(&self, address: u8) -> Option<SimulatedMeter> {
        self.state().meters.remove(&address)
    }

    /// Let the next `count` transactions with `address` time out.
    pub fn fail_next(&self, address: u8, count: u32) {
        self.state().failures.insert(address, count);
    }

    /// Change one register of the meter at `address`.
    pub fn update(&self, address: u8, f: impl FnOnce(&mut SimulatedMeter)) {
        if let Some(meter) = self.state().meters.get_mut(&address) {
            f(meter);
        }
    }

    pub fn device(&self, address: u8) -> SimulatedTransport {
        SimulatedTransport {
            bus: self.clone(),
            address,
        }
    }

    fn transact<R>(
        &self,
        address: u8,
        f: impl FnOnce(&mut BusState) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut state = self.state();
        if let Some(remaining) = state.failures.get_mut(&address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Timeout(NO_RESPONSE));
            }
        }
        if !state.meters.contains_key(&address) {
            return Err(TransportError::Timeout(NO_RESPONSE));
        }
        f(&mut *state)
    }
}

/// [`RegisterTransport`] of one address on a [`SimulatedBus`].
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    bus: SimulatedBus,
    address: u8,
}

#[async_trait]
impl RegisterTransport for SimulatedTransport {
    async fn read_registers(
        &mut self,
        start: Address,
        count: Quantity,
        function: FunctionCode,
    ) -> Result<Vec<Word>, TransportError> {
        let address = self.address;
        self.bus.transact(address, |state| {
            let meter = &state.meters[&address];
            match function {
                FunctionCode::ReadInputRegisters => meter.input_registers.read(start, count),
                FunctionCode::ReadHoldingRegisters => meter.holding_registers.read(start, count),
                other => Err(TransportError::UnsupportedFunction(other as u8)),
            }
        })
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
        let address = self.address;
        self.bus.transact(address, |state| {
            let mut meter = state
                .meters
                .remove(&address)
                .ok_or(TransportError::Timeout(NO_RESPONSE))?;
            let result = meter.holding_registers.write(offset, value);
            // The meter answers at its new address from the next transaction on.
            let answers_at = match (&result, offset) {
                (Ok(()), ADDRESS_REGISTER) => value as u8,
                _ => address,
            };
            state.meters.insert(answers_at, meter);
            result
        })
    }

    fn rebind(self, address: u8) -> Self {
        Self {
            bus: self.bus,
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_read_write() {
        let mut registers = Registers::default();
        registers.insert(1, &[10, 20]);

        assert_eq!(registers.read(1, 2).unwrap(), vec![10, 20]);
        assert!(registers.read(0, 2).is_err());
        registers.write(2, 30).unwrap();
        assert_eq!(registers.read(2, 1).unwrap(), vec![30]);
        assert!(registers.write(5, 1).is_err());
    }

    #[tokio::test]
    async fn test_absent_address_times_out() {
        let bus = SimulatedBus::default();
        let mut transport = bus.device(7);

        let err = transport
            .read_registers(0, 1, FunctionCode::ReadInputRegisters)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_write_rejects_read_function() {
        let bus = SimulatedBus::default();
        bus.attach(7, SimulatedMeter::ac([0; 10], 0));
        let mut transport = bus.device(7);

        let err = transport
            .write_register(ADDRESS_REGISTER, 8, FunctionCode::ReadHoldingRegisters)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedFunction(0x03)));
    }
}
