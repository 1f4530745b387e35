//! Per-particle behaviour actions and the pipeline executing them.
//!
//! Ordinary actions come from enabled `action.*` configuration blocks and run in
//! descending priority on particles that are not locked. System actions (age
//! monitoring, then the move) always run afterwards, whatever the lock state.

pub mod advection;
pub mod mortality;
pub mod orientation;
pub mod recruitment;
pub mod system;

use std::cmp::Reverse;

use tracing::{debug, info};

use crate::config::Configuration;
use crate::dataset::Dataset;
use crate::error::{SimError, SimResult};
use crate::particle::Particle;
use crate::registry::Registry;
use crate::zone::ZoneIndex;

/// Resources available to actions while they load their parameters.
pub struct SetupContext<'a> {
    pub config: &'a Configuration,
    pub zones: &'a mut ZoneIndex,
    /// Output trackers requested by actions (`zone:<prefix>` or an attribute name).
    pub trackers: &'a mut Vec<String>,
    pub seed: Option<u64>,
}

impl SetupContext<'_> {
    pub fn request_tracker(&mut self, tracker: impl Into<String>) {
        let tracker = tracker.into();
        if !self.trackers.contains(&tracker) {
            self.trackers.push(tracker);
        }
    }
}

/// Read-only view of the run handed to actions every step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub dataset: &'a dyn Dataset,
    pub zones: &'a ZoneIndex,
    pub time: f64,
    /// Signed step in seconds.
    pub dt: f64,
    pub transport_duration: f64,
    pub keep_drifting: bool,
}

pub trait Action: Send {
    /// Parse and validate the block parameters. Runs once per setup.
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()>;

    /// Derive particle-specific constants when `particle` is released.
    fn init(&mut self, _particle: &mut Particle, _ctx: &StepContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn parse(key: &str, value: &str) -> SimResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Priority::High),
            "NORMAL" => Ok(Priority::Normal),
            "LOW" => Ok(Priority::Low),
            _ => Err(SimError::invalid(key, value, "expected HIGH, NORMAL or LOW")),
        }
    }
}

pub type ActionRegistry = Registry<dyn Action>;

pub fn default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new("action");
    registry
        .register("orientation.cardinal", |params| {
            Ok(Box::new(orientation::CardinalOrientation::new(params.key())) as Box<dyn Action>)
        })
        .register("orientation.rheotaxis", |params| {
            Ok(Box::new(orientation::Rheotaxis::new(params.key())) as Box<dyn Action>)
        })
        .register("advection", |params| {
            Ok(Box::new(advection::Advection::new(params.key())) as Box<dyn Action>)
        })
        .register("recruitment.zone", |params| {
            Ok(Box::new(recruitment::ZoneRecruitment::new(params.key())) as Box<dyn Action>)
        })
        .register("mortality.lethal_temperature", |params| {
            Ok(Box::new(mortality::LethalTemperature::new(params.key())) as Box<dyn Action>)
        });
    registry
}

struct Slot {
    key: String,
    priority: Priority,
    action: Box<dyn Action>,
}

/// Ordered ordinary actions followed by the system actions.
pub struct ActionPipeline {
    ordinary: Vec<Slot>,
    system: Vec<Box<dyn Action>>,
}

impl Default for ActionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionPipeline {
    pub fn new() -> Self {
        Self {
            ordinary: Vec::new(),
            system: Vec::new(),
        }
    }

    /// Instantiate every enabled `action.*` block and the system actions.
    pub fn setup(&mut self, ctx: &mut SetupContext<'_>, registry: &ActionRegistry) -> SimResult<()> {
        self.ordinary.clear();
        self.system.clear();
        let config = ctx.config;
        for block in config.enabled_blocks("action")? {
            let params = config.block(&block);
            let priority = Priority::parse(
                &params.full_key("priority"),
                &params.get_string_or("priority", "NORMAL")?,
            )?;
            let mut action = registry.instantiate(params)?;
            action
                .load_parameters(ctx)
                .map_err(|err| SimError::instantiation(&block, err))?;
            self.ordinary.push(Slot {
                key: block,
                priority,
                action,
            });
        }
        self.sort();

        let mut age = system::AgeMonitoring::default();
        age.load_parameters(ctx)?;
        let mut motion = system::Move::default();
        motion.load_parameters(ctx)?;
        self.system.push(Box::new(age));
        self.system.push(Box::new(motion));
        info!(actions = ?self.order(), "action setup [OK]");
        Ok(())
    }

    /// Add an already configured ordinary action and restore priority order.
    pub fn push(&mut self, key: &str, priority: Priority, action: Box<dyn Action>) {
        self.ordinary.push(Slot {
            key: key.to_string(),
            priority,
            action,
        });
        self.sort();
    }

    pub fn push_system(&mut self, action: Box<dyn Action>) {
        self.system.push(action);
    }

    fn sort(&mut self) {
        // Stable: equal priorities keep configuration order.
        self.ordinary.sort_by_key(|slot| Reverse(slot.priority));
    }

    /// Block keys of the ordinary actions in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.ordinary.iter().map(|slot| slot.key.as_str()).collect()
    }

    /// Run every action's per-particle initialisation on a newly released particle.
    pub fn init_particle(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        for slot in &mut self.ordinary {
            slot.action.init(particle, ctx)?;
        }
        for action in &mut self.system {
            action.init(particle, ctx)?;
        }
        Ok(())
    }

    pub fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        for slot in &mut self.ordinary {
            if particle.locked {
                debug!(particle = particle.index, action = %slot.key, "locked particle skipped");
                break;
            }
            slot.action.execute(particle, ctx)?;
        }
        for action in &mut self.system {
            action.execute(particle, ctx)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::testing::Probe;
    use super::*;
    use crate::dataset::UniformDataset;

    fn probe(label: &str, log: &Arc<Mutex<Vec<String>>>, lock_after: bool) -> Box<dyn Action> {
        Box::new(Probe {
            label: label.to_string(),
            log: Arc::clone(log),
            lock_after,
        })
    }

    fn step_context<'a>(dataset: &'a UniformDataset, zones: &'a ZoneIndex) -> StepContext<'a> {
        StepContext {
            dataset,
            zones,
            time: 0.0,
            dt: 3_600.0,
            transport_duration: 86_400.0,
            keep_drifting: false,
        }
    }

    #[test]
    fn priorities_order_execution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ActionPipeline::new();
        pipeline.push("action.low", Priority::Low, probe("LOW", &log, false));
        pipeline.push("action.normal", Priority::Normal, probe("NORMAL", &log, false));
        pipeline.push("action.high", Priority::High, probe("HIGH", &log, false));

        let dataset = UniformDataset::builder().build();
        let zones = ZoneIndex::new();
        let ctx = step_context(&dataset, &zones);
        let mut particle = Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap();
        pipeline.execute(&mut particle, &ctx).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["HIGH", "NORMAL", "LOW"]);
    }

    #[test]
    fn equal_priorities_keep_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ActionPipeline::new();
        pipeline.push("action.b", Priority::Normal, probe("b", &log, false));
        pipeline.push("action.a", Priority::Normal, probe("a", &log, false));
        pipeline.push("action.c", Priority::High, probe("c", &log, false));
        assert_eq!(pipeline.order(), vec!["action.c", "action.b", "action.a"]);
    }

    #[test]
    fn locked_particles_only_see_system_actions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ActionPipeline::new();
        pipeline.push("action.locker", Priority::High, probe("locker", &log, true));
        pipeline.push("action.after", Priority::Low, probe("after", &log, false));
        pipeline.push_system(probe("system", &log, false));

        let dataset = UniformDataset::builder().build();
        let zones = ZoneIndex::new();
        let ctx = step_context(&dataset, &zones);
        let mut particle = Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap();
        pipeline.execute(&mut particle, &ctx).unwrap();
        pipeline.execute(&mut particle, &ctx).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["locker", "system", "system"]);
    }

    #[test]
    fn priority_names_parse() {
        assert_eq!(Priority::parse("p", "high").unwrap(), Priority::High);
        assert_eq!(Priority::parse("p", " Low ").unwrap(), Priority::Low);
        assert!(Priority::parse("p", "urgent").is_err());
    }
}
