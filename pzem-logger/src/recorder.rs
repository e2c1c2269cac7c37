//! Minute-slotted recorder writing the latest metric values into a series file.
//!
//! Slot `n` of a file is item `n`, counted in minutes from 00:00 UTC of the
//! epoch date kept in the file header. Every tick backfills skipped slots
//! with empty records, so the item area stays dense.

use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::SeriesError;
use crate::metric::MetricSource;
use crate::slot::{first_tick_delay, slot_index, SLOT_PERIOD};
use crate::teafile::{Description, FieldType, ItemDescription, NameValue, TeaFile};

const YEAR: &str = "year";
const MONTH: &str = "month";
const DAY: &str = "day";

#[derive(Debug)]
pub struct Recorder {
    series_name: String,
    tf: TeaFile,
    sources: Vec<MetricSource>,
    epoch: NaiveDate,
}

impl Recorder {
    /// Open the series file at `path`, or create it with `today` as epoch.
    ///
    /// An existing file keeps its epoch and must have one field per source,
    /// named after the source metric, in order.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        series_name: &str,
        sources: Vec<MetricSource>,
        today: NaiveDate,
    ) -> Result<Self, SeriesError> {
        let path = path.as_ref();
        let names = sources
            .iter()
            .map(|source| source.metric.record_name())
            .collect::<Vec<_>>();

        let tf = if path.is_file() {
            let tf = TeaFile::open_write(path)?;
            let found = tf.description().item.field_names();
            if found != names {
                return Err(SeriesError::SchemaMismatch {
                    declared: names,
                    found: found.into_iter().map(String::from).collect(),
                });
            }
            tf
        } else {
            let fields = names
                .iter()
                .zip(&sources)
                .map(|(name, source)| (name.as_str(), source.metric.ty.field_type()))
                .collect::<Vec<(&str, FieldType)>>();
            log::debug!(
                "{}: fields={} types={}",
                path.display(),
                names.join(" "),
                sources.iter().map(|s| s.metric.type_tag()).collect::<String>()
            );
            let description = Description::new(ItemDescription::new(None, &fields)?)
                .with_content(series_name)
                .with_name_value(YEAR, NameValue::Int32(today.year()))
                .with_name_value(MONTH, NameValue::Int32(today.month() as i32))
                .with_name_value(DAY, NameValue::Int32(today.day() as i32));
            TeaFile::create(path, description)?
        };

        let epoch = read_epoch(&tf)?;
        log::info!(
            "recording {series_name} to {} from {epoch}",
            path.display()
        );

        Ok(Self {
            series_name: series_name.to_string(),
            tf,
            sources,
            epoch,
        })
    }

    pub fn series_name(&self) -> &str {
        &self.series_name
    }

    pub fn epoch(&self) -> NaiveDate {
        self.epoch
    }

    pub fn record_count(&self) -> Result<u64, SeriesError> {
        self.tf.item_count()
    }

    /// Record the current values into the slot of `now`, backfilling missed
    /// slots first. Returns the written slot, or `None` when `now` lies
    /// before the epoch.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<Option<u64>, SeriesError> {
        let Ok(slot) = u64::try_from(slot_index(self.epoch, now)) else {
            log::warn!(
                "{}: clock is before epoch {}, skipping tick at {now}",
                self.series_name,
                self.epoch
            );
            return Ok(None);
        };

        let empty = self
            .sources
            .iter()
            .map(|source| source.metric.empty_field())
            .collect::<Vec<_>>();
        let mut count = self.tf.item_count()?;
        self.tf.seek_item(count)?;
        let mut filled = 0;
        while count < slot {
            self.tf.write_item(&empty)?;
            count += 1;
            filled += 1;
        }
        if filled > 0 {
            log::debug!("{}: filled in {filled} empty records", self.series_name);
        }

        let values = self
            .sources
            .iter()
            .map(|source| source.metric.field_value(source.latest()))
            .collect::<Vec<_>>();
        self.tf.seek_item(slot)?;
        self.tf.write_item(&values)?;
        self.tf.flush()?;
        log::debug!("{}: record {slot}: {values:?}", self.series_name);

        Ok(Some(slot))
    }

    pub fn tick(&mut self) -> Result<Option<u64>, SeriesError> {
        self.tick_at(Utc::now())
    }

    /// Values of slot `n` in metric order, `None` past the last record.
    pub fn read_slot(&mut self, n: u64) -> Result<Option<Vec<f64>>, SeriesError> {
        let item = self.tf.read_item_at(n)?;
        self.tf.seek_end()?;
        Ok(item.map(|values| values.iter().map(|value| value.as_f64()).collect()))
    }

    pub fn close(self) -> Result<(), SeriesError> {
        log::debug!("{}: closing", self.series_name);
        self.tf.close()
    }
}

fn read_epoch(tf: &TeaFile) -> Result<NaiveDate, SeriesError> {
    let description = tf.description();
    let part = |name: &str| {
        description
            .name_value(name)
            .and_then(NameValue::as_i32)
            .ok_or(SeriesError::StartDate)
    };
    let year = part(YEAR)?;
    let month = u32::try_from(part(MONTH)?).map_err(|_| SeriesError::StartDate)?;
    let day = u32::try_from(part(DAY)?).map_err(|_| SeriesError::StartDate)?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or(SeriesError::StartDate)
}

/// A recorder ticking on its own task.
#[derive(Debug)]
pub struct RecorderHandle {
    series_name: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<(), SeriesError>>,
}

impl RecorderHandle {
    /// Tick `recorder` on every minute boundary until stopped.
    ///
    /// The first tick is immediate when already on a boundary. A failing tick
    /// ends the task; its series name is sent on `failed`.
    pub fn spawn(recorder: Recorder, failed: Option<mpsc::UnboundedSender<String>>) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let series_name = recorder.series_name.clone();
        let task = tokio::spawn(run(recorder, stop_rx, failed));
        Self {
            series_name,
            stop,
            task,
        }
    }

    pub fn series_name(&self) -> &str {
        &self.series_name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop ticking and close the file. Returns the error that ended the task, if any.
    pub async fn stop(self) -> Result<(), SeriesError> {
        let _ = self.stop.send(true);
        self.task.await?
    }
}

async fn run(
    mut recorder: Recorder,
    mut stop: watch::Receiver<bool>,
    failed: Option<mpsc::UnboundedSender<String>>,
) -> Result<(), SeriesError> {
    let delay = first_tick_delay(Utc::now());
    log::debug!(
        "{}: first tick in {}s",
        recorder.series_name,
        delay.as_secs()
    );
    let mut interval = tokio::time::interval_at(Instant::now() + delay, SLOT_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = recorder.tick() {
                    log::error!("{}: recording failed, stopping: {err}", recorder.series_name);
                    if let Some(failed) = &failed {
                        let _ = failed.send(recorder.series_name.clone());
                    }
                    return Err(err);
                }
            }
            _ = stop.changed() => break,
        }
    }

    recorder.close()
}
