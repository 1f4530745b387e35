//! Time-series recording of the particle population.
//!
//! The [`OutputManager`] decides what is recorded and when; an [`OutputSink`]
//! decides where it goes. Geometry is written once at initialization, then one
//! record per `record_frequency` steps, then a final record at the last step
//! unless the run was interrupted.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Configuration;
use crate::dataset::Dataset;
use crate::error::{SimError, SimResult};
use crate::particle::Particle;
use crate::zone::ZoneIndex;

pub const OUTPUT_ENABLED_KEY: &str = "app.output.enabled";
pub const RECORD_FREQUENCY_KEY: &str = "app.output.record_frequency";
pub const CUSTOM_TRACKERS_KEY: &str = "app.output.custom_trackers";

/// Outline of one zone, vertices as `(lon, lat)`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneOutline {
    pub key: String,
    pub prefix: String,
    pub index: f64,
    pub polygon: Vec<(f64, f64)>,
}

/// Static geometry written before the first record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Geometry {
    pub edge: Vec<(f64, f64)>,
    pub land: Vec<(f64, f64)>,
    pub zones: Vec<ZoneOutline>,
}

impl Geometry {
    pub fn collect(dataset: &dyn Dataset, zones: &ZoneIndex) -> Self {
        Self {
            edge: dataset.edge(),
            land: dataset.land_points(),
            zones: zones
                .all()
                .iter()
                .map(|zone| ZoneOutline {
                    key: zone.key.clone(),
                    prefix: zone.prefix.clone(),
                    index: zone.index,
                    polygon: zone.polygon().collect(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordHeader {
    pub step: usize,
    pub time: f64,
    pub date: String,
    /// Set on the record written at the last step.
    pub last: bool,
}

/// Destination of the recorded time series.
pub trait OutputSink: Send {
    fn open(&mut self, geometry: &Geometry) -> SimResult<()>;

    fn begin_record(&mut self, header: &RecordHeader) -> SimResult<()>;

    /// One value per particle, in population order. `None` marks a missing value.
    fn write_variable(&mut self, name: &str, values: &[Option<f64>]) -> SimResult<()>;

    fn end_record(&mut self) -> SimResult<()>;

    fn close(&mut self) -> SimResult<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tracker {
    Lon,
    Lat,
    Depth,
    Age,
    Mortality,
    /// Index of the first zone of the prefix containing the particle.
    Zone(String),
    /// A named particle attribute.
    Attribute(String),
}

impl Tracker {
    /// `zone:<prefix>` names a zone tracker, anything else a particle attribute.
    pub fn parse(name: &str) -> Self {
        match name.strip_prefix("zone:") {
            Some(prefix) => Tracker::Zone(prefix.to_string()),
            None => Tracker::Attribute(name.to_string()),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Tracker::Lon => "lon".to_string(),
            Tracker::Lat => "lat".to_string(),
            Tracker::Depth => "depth".to_string(),
            Tracker::Age => "age".to_string(),
            Tracker::Mortality => "mortality".to_string(),
            Tracker::Zone(prefix) => format!("zone:{prefix}"),
            Tracker::Attribute(name) => name.clone(),
        }
    }

    fn value(&self, particle: &Particle, dataset: &dyn Dataset, zones: &ZoneIndex) -> Option<f64> {
        match self {
            Tracker::Lon => Some(particle.lon),
            Tracker::Lat => Some(particle.lat),
            Tracker::Depth => particle.depth,
            Tracker::Age => Some(particle.age),
            Tracker::Mortality => Some(f64::from(particle.mortality().code())),
            Tracker::Zone(prefix) => zones
                .find_zones(particle, dataset, Some(prefix))
                .first()
                .copied(),
            Tracker::Attribute(name) => particle.attribute(name),
        }
    }
}

/// Everything a record is built from.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    pub step: usize,
    pub time: f64,
    pub date: &'a str,
    pub particles: &'a [Particle],
    pub dataset: &'a dyn Dataset,
    pub zones: &'a ZoneIndex,
}

pub struct OutputManager {
    sink: Box<dyn OutputSink>,
    enabled: bool,
    frequency: usize,
    trackers: Vec<Tracker>,
    custom: Vec<String>,
    records: usize,
    last_recorded_step: Option<usize>,
    open: bool,
}

impl OutputManager {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            enabled: true,
            frequency: 1,
            trackers: Vec::new(),
            custom: Vec::new(),
            records: 0,
            last_recorded_step: None,
            open: false,
        }
    }

    /// Read the recording parameters and the configured custom trackers.
    pub fn setup(&mut self, config: &Configuration) -> SimResult<()> {
        self.enabled = config.get_bool_or(OUTPUT_ENABLED_KEY, true)?;
        let frequency = config.get_f64_or(RECORD_FREQUENCY_KEY, 1.0)?;
        if frequency < 1.0 || frequency.fract() != 0.0 {
            return Err(SimError::invalid(
                RECORD_FREQUENCY_KEY,
                frequency,
                "record frequency must be a positive whole number of steps",
            ));
        }
        self.frequency = frequency as usize;
        self.trackers = vec![
            Tracker::Lon,
            Tracker::Lat,
            Tracker::Age,
            Tracker::Mortality,
        ];
        self.custom = if config.is_null(CUSTOM_TRACKERS_KEY) {
            Vec::new()
        } else {
            config.get_list(CUSTOM_TRACKERS_KEY)?
        };
        self.records = 0;
        self.last_recorded_step = None;
        self.open = false;
        info!(
            enabled = self.enabled,
            frequency = self.frequency,
            custom = ?self.custom,
            "output setup [OK]"
        );
        Ok(())
    }

    pub fn add_tracker(&mut self, tracker: Tracker) {
        if !self.trackers.contains(&tracker) {
            self.trackers.push(tracker);
        }
    }

    pub fn trackers(&self) -> Vec<String> {
        self.trackers.iter().map(Tracker::name).collect()
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Settle the tracker list and write the static geometry.
    ///
    /// Trackers come in this order: the predefined ones (depth only for 3-D
    /// datasets), those `requested` by other subsystems, then the custom ones.
    pub fn initialize(
        &mut self,
        dataset: &dyn Dataset,
        zones: &ZoneIndex,
        requested: &[String],
    ) -> SimResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if dataset.is_3d() {
            self.trackers.insert(2, Tracker::Depth);
        }
        let custom = std::mem::take(&mut self.custom);
        for name in requested.iter().chain(custom.iter()) {
            self.add_tracker(Tracker::parse(name));
        }
        self.custom = custom;
        self.sink.open(&Geometry::collect(dataset, zones))?;
        self.open = true;
        info!(trackers = ?self.trackers(), "output initialization [OK]");
        Ok(())
    }

    pub fn next_step(&mut self, snapshot: &Snapshot<'_>) -> SimResult<()> {
        if self.enabled && snapshot.step % self.frequency == 0 {
            self.record(snapshot, false)?;
        }
        Ok(())
    }

    /// Final record unless interrupted, then close the sink.
    pub fn last_step(&mut self, snapshot: &Snapshot<'_>, interrupted: bool) -> SimResult<()> {
        if !self.enabled || !self.open {
            return Ok(());
        }
        if !interrupted && self.last_recorded_step != Some(snapshot.step) {
            self.record(snapshot, true)?;
        }
        self.open = false;
        self.sink.close()?;
        info!(records = self.records, interrupted, "output closed");
        Ok(())
    }

    fn record(&mut self, snapshot: &Snapshot<'_>, last: bool) -> SimResult<()> {
        self.sink.begin_record(&RecordHeader {
            step: snapshot.step,
            time: snapshot.time,
            date: snapshot.date.to_string(),
            last,
        })?;
        let mut failed = Vec::new();
        for tracker in &self.trackers {
            let values: Vec<Option<f64>> = snapshot
                .particles
                .iter()
                .map(|particle| tracker.value(particle, snapshot.dataset, snapshot.zones))
                .collect();
            if let Err(err) = self.sink.write_variable(&tracker.name(), &values) {
                warn!(tracker = %tracker.name(), error = %err, "tracker dropped after a write failure");
                failed.push(tracker.clone());
            }
        }
        self.trackers.retain(|tracker| !failed.contains(tracker));
        self.sink.end_record()?;
        self.records += 1;
        self.last_recorded_step = Some(snapshot.step);
        Ok(())
    }
}

/// One record captured by a [`MemorySink`].
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryRecord {
    pub header: RecordHeader,
    pub variables: BTreeMap<String, Vec<Option<f64>>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryLog {
    pub geometry: Option<Geometry>,
    pub records: Vec<MemoryRecord>,
    pub closed: bool,
}

/// Keeps every record in memory behind a shared handle.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
    failing: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write of `variable` fail.
    pub fn failing_on(mut self, variable: &str) -> Self {
        self.failing = Some(variable.to_string());
        self
    }

    pub fn log(&self) -> Arc<Mutex<MemoryLog>> {
        Arc::clone(&self.log)
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut MemoryLog) -> T) -> SimResult<T> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| SimError::Output("memory sink lock poisoned".to_string()))?;
        Ok(f(&mut log))
    }
}

impl OutputSink for MemorySink {
    fn open(&mut self, geometry: &Geometry) -> SimResult<()> {
        self.with_log(|log| log.geometry = Some(geometry.clone()))
    }

    fn begin_record(&mut self, header: &RecordHeader) -> SimResult<()> {
        self.with_log(|log| {
            log.records.push(MemoryRecord {
                header: header.clone(),
                variables: BTreeMap::new(),
            })
        })
    }

    fn write_variable(&mut self, name: &str, values: &[Option<f64>]) -> SimResult<()> {
        if self.failing.as_deref() == Some(name) {
            return Err(SimError::Output(format!("cannot write variable {name}")));
        }
        self.with_log(|log| match log.records.last_mut() {
            Some(record) => {
                record.variables.insert(name.to_string(), values.to_vec());
                Ok(())
            }
            None => Err(SimError::Output(format!("variable {name} written outside a record"))),
        })?
    }

    fn end_record(&mut self) -> SimResult<()> {
        Ok(())
    }

    fn close(&mut self) -> SimResult<()> {
        self.with_log(|log| log.closed = true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::UniformDataset;
    use serde_json::json;

    fn snapshot<'a>(
        step: usize,
        particles: &'a [Particle],
        dataset: &'a UniformDataset,
        zones: &'a ZoneIndex,
    ) -> Snapshot<'a> {
        Snapshot {
            step,
            time: step as f64 * 60.0,
            date: "year 1900 month 01 day 01 at 00:00",
            particles,
            dataset,
            zones,
        }
    }

    fn manager(config: serde_json::Value, sink: MemorySink) -> OutputManager {
        let config = Configuration::from_value(config).unwrap();
        let mut manager = OutputManager::new(Box::new(sink));
        manager.setup(&config).unwrap();
        manager
    }

    fn requested() -> Vec<String> {
        vec!["zone:release".to_string(), "recruited".to_string()]
    }

    #[test]
    fn records_follow_frequency_and_final_step() {
        let sink = MemorySink::new();
        let log = sink.log();
        let mut output = manager(json!({"app.output.record_frequency": 2}), sink);
        let dataset = UniformDataset::builder().land_cell(3, 3).build();
        let zones = ZoneIndex::new();
        let particles = vec![Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap()];
        output.initialize(&dataset, &zones, &requested()).unwrap();
        for step in 0..5 {
            output.next_step(&snapshot(step, &particles, &dataset, &zones)).unwrap();
        }
        output.last_step(&snapshot(5, &particles, &dataset, &zones), false).unwrap();

        let log = log.lock().unwrap();
        let steps: Vec<usize> = log.records.iter().map(|record| record.header.step).collect();
        assert_eq!(steps, vec![0, 2, 4, 5]);
        assert!(log.records[3].header.last);
        assert!(log.closed);
        assert_eq!(log.geometry.as_ref().unwrap().land, vec![(3.0, 3.0)]);
        assert_eq!(log.records[0].variables["lon"], vec![Some(4.0)]);
        assert_eq!(log.records[0].variables["zone:release"], vec![None]);
    }

    #[test]
    fn interrupted_runs_skip_the_final_record() {
        let sink = MemorySink::new();
        let log = sink.log();
        let mut output = manager(json!({}), sink);
        let dataset = UniformDataset::builder().build();
        let zones = ZoneIndex::new();
        let particles = Vec::new();
        output.initialize(&dataset, &zones, &requested()).unwrap();
        output.next_step(&snapshot(0, &particles, &dataset, &zones)).unwrap();
        output.last_step(&snapshot(1, &particles, &dataset, &zones), true).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.records.len(), 1);
        assert!(log.closed);
    }

    #[test]
    fn failing_tracker_is_dropped_and_run_continues() {
        let sink = MemorySink::new().failing_on("age");
        let log = sink.log();
        let mut output = manager(json!({}), sink);
        let dataset = UniformDataset::builder().build();
        let zones = ZoneIndex::new();
        let particles = vec![Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap()];
        output.initialize(&dataset, &zones, &requested()).unwrap();
        output.next_step(&snapshot(0, &particles, &dataset, &zones)).unwrap();
        assert!(!output.trackers().contains(&"age".to_string()));
        output.next_step(&snapshot(1, &particles, &dataset, &zones)).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.records.len(), 2);
        assert!(log.records[1].variables.contains_key("lat"));
    }

    #[test]
    fn tracker_order_and_custom_names() {
        let mut output = manager(
            json!({"app.output.custom_trackers": "temperature, recruited"}),
            MemorySink::new(),
        );
        let dataset = UniformDataset::builder().build();
        output.initialize(&dataset, &ZoneIndex::new(), &requested()).unwrap();
        assert_eq!(
            output.trackers(),
            vec!["lon", "lat", "age", "mortality", "zone:release", "recruited", "temperature"]
        );
    }

    #[test]
    fn three_d_datasets_track_depth() {
        let mut output = manager(json!({}), MemorySink::new());
        let dataset = UniformDataset::builder().three_d(true).build();
        output.initialize(&dataset, &ZoneIndex::new(), &[]).unwrap();
        assert_eq!(output.trackers()[2], "depth");
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let config = Configuration::from_value(json!({"app.output.record_frequency": 0})).unwrap();
        let mut output = OutputManager::new(Box::new(MemorySink::new()));
        assert!(output.setup(&config).is_err());
    }
}
