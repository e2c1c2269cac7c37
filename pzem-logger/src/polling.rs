//! Periodic polling of every configured meter.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::bus::PublishSink;
use crate::instrument::Meter;
use crate::publisher::DevicePublisher;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Meters paired with the publishers of their readings.
pub struct PollingService<S> {
    devices: Vec<(Box<dyn Meter>, DevicePublisher<S>)>,
    interval: Duration,
}

impl<S: PublishSink> PollingService<S> {
    pub fn new(interval: Duration) -> Self {
        Self {
            devices: Vec::new(),
            interval,
        }
    }

    pub fn add(&mut self, meter: Box<dyn Meter>, publisher: DevicePublisher<S>) {
        log::info!(
            "polling {} meter {} as {}",
            meter.variant(),
            meter.address(),
            publisher.role()
        );
        self.devices.push((meter, publisher));
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn publishers(&self) -> impl Iterator<Item = &DevicePublisher<S>> {
        self.devices.iter().map(|(_, publisher)| publisher)
    }

    /// Poll every meter once, in order. Returns the number of failed polls.
    pub async fn poll_once(&mut self) -> usize {
        let mut failed = 0;
        for (meter, publisher) in &mut self.devices {
            match meter.poll_readings().await {
                Ok(readings) => {
                    log::debug!("meter {}: {readings}", meter.address());
                    publisher.record_success(&readings);
                }
                Err(err) => {
                    log::debug!("meter {}: {err}", meter.address());
                    publisher.record_failure(&err);
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Poll every interval until `stop` turns true or its sender is dropped.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let started = Instant::now();
                    self.poll_once().await;
                    let elapsed = started.elapsed();
                    if elapsed > self.interval {
                        log::warn!(
                            "polling {} meters took {elapsed:?}, longer than the {:?} interval",
                            self.devices.len(),
                            self.interval
                        );
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusValue, ServiceHandle, ValueBus};
    use crate::decode::Variant;
    use crate::instrument::meter;
    use crate::publisher::DeviceRole;
    use crate::simulator::{SimulatedBus, SimulatedMeter};

    const AC_WORDS: [u16; 10] = [2300, 500, 0, 1500, 0, 0, 0, 500, 10, 1];

    fn service(
        field_bus: &SimulatedBus,
        bus: &ValueBus,
        devices: &[(u8, DeviceRole)],
    ) -> PollingService<ServiceHandle> {
        let mut service = PollingService::new(POLL_INTERVAL);
        for &(address, role) in devices {
            let handle = bus
                .register_service(&role.service_name("ttyUSB0", address))
                .unwrap();
            service.add(
                meter(field_bus.device(address), address, role.variant()),
                DevicePublisher::new(handle, role, "ttyUSB0", address),
            );
        }
        service
    }

    #[tokio::test]
    async fn test_poll_once_publishes_each_meter() {
        let field_bus = SimulatedBus::default();
        field_bus.attach(10, SimulatedMeter::ac(AC_WORDS, 0));
        field_bus.attach(
            30,
            SimulatedMeter::dc([1250, 300, 375, 0, 120, 0, 0, 0], [0x7530, 0x0320, 0x0001]),
        );
        let bus = ValueBus::new();
        let mut service = service(
            &field_bus,
            &bus,
            &[(10, DeviceRole::Grid), (30, DeviceRole::DcMeter)],
        );

        assert_eq!(service.poll_once().await, 0);

        let grid = DeviceRole::Grid.service_name("ttyUSB0", 10);
        assert_eq!(bus.get(&grid, "/Ac/L1/Voltage"), BusValue::Float(230.0));
        assert_eq!(bus.get(&grid, "/Connected"), BusValue::Int(1));
        let dc = DeviceRole::DcMeter.service_name("ttyUSB0", 30);
        assert_eq!(bus.get(&dc, "/Dc/0/Voltage"), BusValue::Float(12.5));
        assert_eq!(bus.get(&dc, "/Connected"), BusValue::Int(1));
        assert_eq!(Variant::Dc, DeviceRole::DcMeter.variant());
    }

    #[tokio::test]
    async fn test_failing_meter_does_not_stop_others() {
        let field_bus = SimulatedBus::default();
        field_bus.attach(10, SimulatedMeter::ac(AC_WORDS, 0));
        field_bus.attach(20, SimulatedMeter::ac(AC_WORDS, 0));
        let bus = ValueBus::new();
        let mut service = service(
            &field_bus,
            &bus,
            &[(10, DeviceRole::Pzem016), (20, DeviceRole::Pzem016)],
        );
        field_bus.detach(10);

        assert_eq!(service.poll_once().await, 1);

        let first = DeviceRole::Pzem016.service_name("ttyUSB0", 10);
        let second = DeviceRole::Pzem016.service_name("ttyUSB0", 20);
        assert_eq!(bus.get(&first, "/ErrorCode"), BusValue::Int(1));
        assert_eq!(bus.get(&second, "/ErrorCode"), BusValue::Int(0));
        assert_eq!(bus.get(&second, "/Ac/Voltage"), BusValue::Float(230.0));
    }

    #[tokio::test]
    async fn test_recovered_meter_publishes_new_values() {
        let field_bus = SimulatedBus::default();
        field_bus.attach(10, SimulatedMeter::ac(AC_WORDS, 0));
        let bus = ValueBus::new();
        let mut service = service(&field_bus, &bus, &[(10, DeviceRole::Grid)]);
        let grid = DeviceRole::Grid.service_name("ttyUSB0", 10);

        field_bus.fail_next(10, 1);
        assert_eq!(service.poll_once().await, 1);
        assert_eq!(service.publishers().next().unwrap().consecutive_failures(), 1);

        field_bus.update(10, |meter| meter.set_input(0x0000, 2310));
        assert_eq!(service.poll_once().await, 0);
        assert_eq!(bus.get(&grid, "/Ac/Voltage"), BusValue::Float(231.0));
        assert_eq!(service.publishers().next().unwrap().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let field_bus = SimulatedBus::default();
        field_bus.attach(10, SimulatedMeter::ac(AC_WORDS, 0));
        let bus = ValueBus::new();
        let service = service(&field_bus, &bus, &[(10, DeviceRole::Grid)]);
        let (stop, stop_rx) = watch::channel(false);

        let task = tokio::spawn(service.run(stop_rx));
        // The first tick is immediate.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let grid = DeviceRole::Grid.service_name("ttyUSB0", 10);
        assert_eq!(bus.get(&grid, "/Connected"), BusValue::Int(1));
        assert_eq!(bus.get(&grid, "/Ac/Voltage"), BusValue::Float(230.0));

        stop.send(true).unwrap();
        task.await.unwrap();

        // Stopping drops the services with their values.
        assert!(bus.list_services().is_empty());
        assert_eq!(bus.get(&grid, "/Connected"), BusValue::Invalid);
    }
}
