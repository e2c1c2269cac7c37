//! Recorders for bus services as they come and go.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};

use crate::bus::{BusEvent, ValueBus};
use crate::error::SeriesError;
use crate::metric::{Metric, MetricSource};
use crate::recorder::{Recorder, RecorderHandle};

pub const BATTERY_PREFIX: &str = "com.victronenergy.battery";

/// Services to record: every service under `prefix`, with `metrics` in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub prefix: String,
    pub metrics: Vec<Metric>,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self::battery()
    }
}

impl SourceSpec {
    /// Battery energy history.
    pub fn battery() -> Self {
        Self {
            prefix: BATTERY_PREFIX.to_string(),
            metrics: vec![
                Metric::float("/History/DischargedEnergy"),
                Metric::float("/History/ChargedEnergy"),
            ],
        }
    }

    /// Whether `service` is `prefix` or a name below it, compared by dotted segments.
    pub fn matches(&self, service: &str) -> bool {
        service
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }
}

pub struct LoggerService {
    bus: ValueBus,
    datadir: PathBuf,
    specs: Vec<SourceSpec>,
    recorders: HashMap<String, RecorderHandle>,
    failed_tx: mpsc::UnboundedSender<String>,
    failed_rx: mpsc::UnboundedReceiver<String>,
}

impl LoggerService {
    pub fn new(bus: ValueBus, datadir: impl AsRef<Path>, specs: Vec<SourceSpec>) -> Self {
        let (failed_tx, failed_rx) = mpsc::unbounded_channel();
        Self {
            bus,
            datadir: datadir.as_ref().to_path_buf(),
            specs,
            recorders: HashMap::new(),
            failed_tx,
            failed_rx,
        }
    }

    /// Series file of `service`.
    pub fn series_path(&self, service: &str) -> PathBuf {
        self.datadir.join(format!("log-{service}.tea"))
    }

    pub fn recorded_services(&self) -> Vec<&str> {
        let mut services = self.recorders.keys().map(String::as_str).collect::<Vec<_>>();
        services.sort();
        services
    }

    /// Start recording `service` if a source spec matches it and it is not recorded yet.
    ///
    /// Must be called within a tokio runtime.
    pub fn check_service(&mut self, service: &str) -> Result<bool, SeriesError> {
        if self.recorders.contains_key(service) {
            return Ok(false);
        }
        let Some(spec) = self.specs.iter().find(|spec| spec.matches(service)) else {
            return Ok(false);
        };

        let sources = spec
            .metrics
            .iter()
            .map(|metric| MetricSource::new(metric.clone(), &self.bus, service))
            .collect();
        std::fs::create_dir_all(&self.datadir)?;
        let recorder = Recorder::open_or_create(
            self.series_path(service),
            service,
            sources,
            Utc::now().date_naive(),
        )?;
        let handle = RecorderHandle::spawn(recorder, Some(self.failed_tx.clone()));
        self.recorders.insert(service.to_string(), handle);
        Ok(true)
    }

    /// Stop and close the recorder of `service`, if any.
    pub async fn remove_service(&mut self, service: &str) -> Result<(), SeriesError> {
        match self.recorders.remove(service) {
            Some(handle) => {
                log::info!("{service} vanished, stopping its recorder");
                handle.stop().await
            }
            None => Ok(()),
        }
    }

    /// Check every service currently on the bus.
    pub fn scan(&mut self) -> Result<(), SeriesError> {
        log::info!("searching the bus for services to record...");
        for service in self.bus.list_services() {
            self.check_service(&service)?;
        }
        log::info!("finished search, recording {} services", self.recorders.len());
        Ok(())
    }

    /// Follow services on the bus until stopped. A recorder failure stops
    /// every recorder and is returned.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<(), SeriesError> {
        let mut events = self.bus.events();
        let result = match self.scan() {
            Ok(()) => self.follow(&mut events, &mut stop).await,
            Err(err) => Err(err),
        };
        let shutdown = self.shutdown().await;
        result.and(shutdown)
    }

    async fn follow(
        &mut self,
        events: &mut tokio::sync::broadcast::Receiver<BusEvent>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), SeriesError> {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(BusEvent::ServiceAppeared(service)) => {
                        log::debug!("{service} appeared");
                        self.check_service(&service)?;
                    }
                    Ok(BusEvent::ServiceVanished(service)) => {
                        self.remove_service(&service).await?;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("missed {missed} bus events, rescanning");
                        self.rescan().await?;
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
                Some(service) = self.failed_rx.recv() => {
                    return match self.recorders.remove(&service) {
                        Some(handle) => handle.stop().await,
                        None => Ok(()),
                    };
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn rescan(&mut self) -> Result<(), SeriesError> {
        let present = self.bus.list_services();
        let gone = self
            .recorders
            .keys()
            .filter(|service| !present.contains(service))
            .cloned()
            .collect::<Vec<_>>();
        for service in gone {
            self.remove_service(&service).await?;
        }
        self.scan()
    }

    /// Stop every recorder. Returns the first error met.
    pub async fn shutdown(&mut self) -> Result<(), SeriesError> {
        let mut result = Ok(());
        for (service, handle) in self.recorders.drain() {
            log::debug!("stopping recorder of {service}");
            let stopped = handle.stop().await;
            if result.is_ok() {
                result = stopped;
            }
        }
        result
    }
}
