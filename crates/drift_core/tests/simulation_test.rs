use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use drift_core::actions::{Action, SetupContext, StepContext};
use drift_core::dataset::UniformDataset;
use drift_core::kernels::swim::SwimSpeed;
use drift_core::output::MemorySink;
use drift_core::units::meters_to_degrees;
use drift_core::{Configuration, Mortality, Particle, Registries, SimError, SimResult, Simulation};
use serde_json::json;

fn workspace_file(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").join(relative)
}

fn gulf_config() -> Configuration {
    Configuration::load_from_path(&workspace_file("testdata/configs/gulf_zone_release.json")).unwrap()
}

fn shelf() -> UniformDataset {
    UniformDataset::builder()
        .origin(0.0, 40.0)
        .resolution(0.1)
        .size(30, 30)
        .build()
}

fn single_swimmer() -> Configuration {
    Configuration::from_value(json!({
        "configuration.blocks": ["release.buoy", "action.swim"],
        "app.time": {
            "initial_time": "year 2000 month 06 day 01 at 00:00",
            "time_step": 3600,
            "transport_duration": "0002 day(s) 00 hour(s) 00 minute(s)"
        },
        "release.buoy": {
            "enabled": true,
            "type": "points",
            "longitude": [1.0],
            "latitude": [41.0]
        },
        "action.swim": {
            "enabled": true,
            "type": "orientation.cardinal",
            "heading": 0.0,
            "swimming.speed.hatch": 1.0,
            "swimming.speed.settle": 5.0
        }
    }))
    .unwrap()
}

#[test]
fn eastward_swimmer_moves_by_the_hatch_speed() {
    let mut simulation = Simulation::new(single_swimmer(), Box::new(shelf()), Box::new(MemorySink::new()));
    simulation.setup().unwrap();
    simulation.init().unwrap();
    simulation.first_step().unwrap();
    assert!(simulation.step().unwrap());

    let speed = SwimSpeed::new(1.0, 5.0).speed_at_age(0.0, 2.0);
    let (dlon, dlat) = meters_to_degrees(speed * 3_600.0, 0.0, 41.0);
    let particle = &simulation.particles()[0];
    assert!((particle.lon - (1.0 + dlon)).abs() < 1e-9, "lon {}", particle.lon);
    assert!((particle.lat - 41.0).abs() < 1e-9);
    assert_eq!(dlat, 0.0);
    assert_eq!(particle.age, 3_600.0);
}

#[test]
fn scheduled_events_each_release_once() {
    let sink = MemorySink::new();
    let mut simulation = Simulation::from_config(gulf_config(), Box::new(sink.clone())).unwrap();
    let summary = simulation.run().unwrap();

    assert_eq!(summary.released, 150);
    // 48 h of transport plus the 12 h release span, in 30 min steps.
    assert_eq!(summary.steps, 120);
    assert_eq!(summary.alive + summary.dead.values().sum::<usize>(), 150);
    // The first two batches outlive the transport duration.
    assert_eq!(summary.dead.get(&Mortality::Old.code()), Some(&100));
    assert_eq!(summary.alive, 50);

    let log = sink.log();
    let log = log.lock().unwrap();
    let released: Vec<usize> = log
        .records
        .iter()
        .map(|record| record.variables["lon"].len())
        .collect();
    // Records every 4 steps: releases land at steps 0, 12 and 24.
    assert_eq!(released[0], 0);
    assert_eq!(released[1], 50);
    assert_eq!(released[3], 50);
    assert_eq!(released[4], 100);
    assert_eq!(released[6], 100);
    assert_eq!(released[7], 150);
    assert_eq!(log.records.len(), 31);
    assert!(log.records.last().unwrap().header.last);
}

#[test]
fn requested_and_custom_trackers_are_recorded() {
    let sink = MemorySink::new();
    let mut simulation = Simulation::from_config(gulf_config(), Box::new(sink.clone())).unwrap();
    simulation.run().unwrap();

    let log = sink.log();
    let log = log.lock().unwrap();
    let last = log.records.last().unwrap();
    let names: Vec<&str> = last.variables.keys().map(String::as_str).collect();
    for name in [
        "lon",
        "lat",
        "age",
        "mortality",
        "zone:recruitment",
        "zone:release",
        "recruited",
        "recruited_zone",
        "temperature",
    ] {
        assert!(names.contains(&name), "missing {name} in {names:?}");
    }
    assert!(last.variables["temperature"].iter().all(|value| *value == Some(18.0)));
    let geometry = log.geometry.as_ref().unwrap();
    assert_eq!(geometry.zones.len(), 3);
}

#[test]
fn seeded_runs_are_reproducible() {
    let positions = |seed: i64| {
        let mut config = gulf_config();
        config.set("app.simulation.seed", seed);
        let mut simulation = Simulation::from_config(config, Box::new(MemorySink::new())).unwrap();
        simulation.run().unwrap();
        simulation
            .particles()
            .iter()
            .map(|particle| (particle.lon, particle.lat))
            .collect::<Vec<_>>()
    };
    let first = positions(5);
    assert_eq!(first, positions(5));
    assert_ne!(first, positions(6));
}

#[test]
fn stop_request_skips_the_final_record() {
    let sink = MemorySink::new();
    let mut simulation = Simulation::from_config(gulf_config(), Box::new(sink.clone())).unwrap();
    let handle = simulation.stop_handle();
    std::thread::spawn(move || handle.stop()).join().unwrap();

    let summary = simulation.run().unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.steps, 0);
    assert_eq!(summary.released, 50);

    let log = sink.log();
    let log = log.lock().unwrap();
    assert!(log.closed);
    assert_eq!(log.records.len(), 1);
    assert!(!log.records[0].header.last);
}

#[test]
fn backward_drifters_move_upstream() {
    let mut config =
        Configuration::load_from_path(&workspace_file("testdata/configs/backward_drifters.json")).unwrap();
    config.set(
        "release.drifters.file",
        workspace_file("testdata/drifters/buoys.txt").display().to_string(),
    );
    let mut simulation = Simulation::from_config(config, Box::new(MemorySink::new())).unwrap();
    let summary = simulation.run().unwrap();
    assert_eq!(summary.released, 3);
    assert_eq!(summary.alive, 3);
    assert_eq!(summary.steps, 12);

    let starts = [(1.0, 41.0), (1.5, 41.5), (2.0, 42.0)];
    for (particle, (lon, lat)) in simulation.particles().iter().zip(starts) {
        let (dlon, _) = meters_to_degrees(0.1 * 3_600.0 * 12.0, 0.0, lat);
        assert!((particle.lon - (lon - dlon)).abs() < 1e-6, "lon {}", particle.lon);
        assert!((particle.lat - lat).abs() < 1e-9);
    }
}

struct Tagger {
    key: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Action for Tagger {
    fn load_parameters(&mut self, _ctx: &mut SetupContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn execute(&mut self, _particle: &mut Particle, _ctx: &StepContext<'_>) -> SimResult<()> {
        self.log.lock().unwrap().push(self.key.clone());
        Ok(())
    }
}

#[test]
fn actions_run_by_priority_then_declaration() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registries = Registries::default();
    let shared = Arc::clone(&log);
    registries.actions.register("tagger", move |params| {
        Ok(Box::new(Tagger {
            key: params.key().to_string(),
            log: Arc::clone(&shared),
        }) as Box<dyn Action>)
    });

    let mut config = single_swimmer();
    config.set(
        "configuration.blocks",
        json!(["dataset.uniform", "release.buoy", "action.late", "action.first", "action.middle", "action.early"]),
    );
    config.set("dataset.uniform.enabled", true);
    config.set("dataset.uniform.type", "uniform");
    config.set("app.time.transport_duration", "0 day(s) 1 hour(s)");
    config.set("release.buoy.longitude", json!([4.0]));
    config.set("release.buoy.latitude", json!([4.0]));
    for (block, priority) in [("late", "LOW"), ("first", "HIGH"), ("middle", "NORMAL"), ("early", "HIGH")] {
        config.set(format!("action.{block}.enabled"), true);
        config.set(format!("action.{block}.type"), "tagger");
        config.set(format!("action.{block}.priority"), priority);
    }

    let mut simulation = Simulation::with_registry(config, registries, Box::new(MemorySink::new())).unwrap();
    simulation.run().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["action.first", "action.early", "action.middle", "action.late"]
    );
}

#[test]
fn unknown_action_types_abort_setup() {
    let mut config = single_swimmer();
    config.set("action.swim.type", "orientation.spiral");
    let mut simulation = Simulation::new(config, Box::new(shelf()), Box::new(MemorySink::new()));
    match simulation.run() {
        Err(SimError::UnknownType { tag, block, .. }) => {
            assert_eq!(tag, "orientation.spiral");
            assert_eq!(block, "action.swim");
        }
        other => panic!("expected an unknown type error, got {other:?}"),
    }
}

#[test]
fn releases_before_the_initial_time_are_fatal() {
    let mut config = single_swimmer();
    config.set("app.schedule.enabled", true);
    config.set("app.schedule.events", json!(["year 2000 month 05 day 31 at 00:00"]));
    let mut simulation = Simulation::new(config, Box::new(shelf()), Box::new(MemorySink::new()));
    assert!(matches!(simulation.run(), Err(SimError::Release(_))));
}
