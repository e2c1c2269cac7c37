/// Poll two simulated meters, publish them on the bus and record a simulated
/// battery service into a TeaFile under the system temp directory.
use std::time::Duration;

use pzem_logger::bus::ValueBus;
use pzem_logger::instrument::meter;
use pzem_logger::logger_service::{LoggerService, SourceSpec};
use pzem_logger::polling::{PollingService, POLL_INTERVAL};
use pzem_logger::publisher::{DevicePublisher, DeviceRole, Position};
use pzem_logger::simulator::{SimulatedBus, SimulatedMeter};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let line = SimulatedBus::default();
    line.attach(10, SimulatedMeter::ac([2300, 500, 0, 1500, 0, 0, 0, 500, 95, 0], 2300));
    line.attach(
        11,
        SimulatedMeter::ac([2310, 1200, 0, 2700, 0, 4000, 0, 500, 99, 0], 2300),
    );

    let bus = ValueBus::new();
    let mut polling = PollingService::new(POLL_INTERVAL);
    for (address, role) in [
        (10, DeviceRole::Grid),
        (
            11,
            DeviceRole::PvInverter {
                position: Position::AcOutput,
            },
        ),
    ] {
        let service = bus
            .register_service(&role.service_name("sim", address))
            .unwrap();
        polling.add(
            meter(line.device(address), address, role.variant()),
            DevicePublisher::new(service, role, "sim", address),
        );
    }

    let datadir = std::env::temp_dir().join("pzem-logger-demo");
    let logger = LoggerService::new(bus.clone(), &datadir, vec![SourceSpec::battery()]);

    let (stop, stop_rx) = watch::channel(false);
    let polling = tokio::spawn(polling.run(stop_rx.clone()));
    let logger = tokio::spawn(logger.run(stop_rx));

    let mut battery = bus
        .register_service("com.victronenergy.battery.sim")
        .unwrap();
    for step in 0u16..5 {
        battery.add_path("/History/ChargedEnergy", 10.0 + f64::from(step));
        battery.add_path("/History/DischargedEnergy", 4.0);
        line.update(10, |meter| meter.set_input(0x0000, 2300 + step));
        tokio::time::sleep(Duration::from_secs(1)).await;
        println!(
            "grid voltage {} V, inverter power {} W",
            bus.get("com.victronenergy.grid.pzem_sim_10", "/Ac/Voltage"),
            bus.get("com.victronenergy.pvinverter.pzem-sim-11", "/Ac/Power"),
        );
    }

    stop.send(true).unwrap();
    polling.await.unwrap();
    logger.await.unwrap().unwrap();
    println!("series files in {}", datadir.display());
}
