//! Release schedule and the processes that create particles.
//!
//! The schedule is an ordered list of instants fixed at initialization. A
//! cursor walks it once per run: every NextStep, each instant falling in the
//! step window fires one release event, which runs every enabled `release.*`
//! process.

pub mod points;
pub mod zone;

use tracing::{debug, info};

use crate::actions::SetupContext;
use crate::calendar::Calendar;
use crate::clock::TimeDirection;
use crate::dataset::Dataset;
use crate::error::{SimError, SimResult};
use crate::particle::Particle;
use crate::registry::Registry;
use crate::zone::ZoneIndex;

pub const SCHEDULE_ENABLED_KEY: &str = "app.schedule.enabled";
pub const SCHEDULE_EVENTS_KEY: &str = "app.schedule.events";

/// A scheduled instant handed to the release processes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReleaseEvent {
    /// Position in the schedule.
    pub index: usize,
    pub time: f64,
}

/// What a release process may read while creating particles.
#[derive(Clone, Copy)]
pub struct ReleaseContext<'a> {
    pub dataset: &'a dyn Dataset,
    pub zones: &'a ZoneIndex,
    pub event: ReleaseEvent,
    /// Index assigned to the first particle created by this call.
    pub first_index: usize,
}

pub trait ReleaseProcess: Send {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()>;

    /// Particles created for `ctx.event`, indexed from `ctx.first_index`.
    fn release(&mut self, ctx: &ReleaseContext<'_>) -> SimResult<Vec<Particle>>;
}

pub type ReleaseRegistry = Registry<dyn ReleaseProcess>;

pub fn default_registry() -> ReleaseRegistry {
    let mut registry = ReleaseRegistry::new("release");
    registry
        .register("zone", |params| {
            Ok(Box::new(zone::ZoneRelease::new(params.key())) as Box<dyn ReleaseProcess>)
        })
        .register("points", |params| {
            Ok(Box::new(points::PointRelease::new(params.key())) as Box<dyn ReleaseProcess>)
        });
    registry
}

/// Whether `event` falls in the step window starting at `time`.
///
/// Forward runs use `[time, time + dt)`, backward runs `(time + dt, time]`.
pub fn in_step_window(event: f64, time: f64, dt: f64) -> bool {
    if dt >= 0.0 {
        event >= time && event < time + dt
    } else {
        event <= time && event > time + dt
    }
}

#[derive(Default)]
pub struct ReleaseScheduler {
    events: Vec<f64>,
    cursor: usize,
    released: usize,
    processes: Vec<(String, Box<dyn ReleaseProcess>)>,
}

impl ReleaseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the schedule and build every enabled release process.
    ///
    /// Without an enabled schedule the only release happens at `t0`.
    pub fn setup(
        &mut self,
        ctx: &mut SetupContext<'_>,
        registry: &ReleaseRegistry,
        calendar: Calendar,
        t0: f64,
    ) -> SimResult<()> {
        let config = ctx.config;
        self.reset();
        self.processes.clear();
        self.events = if config.get_bool_or(SCHEDULE_ENABLED_KEY, false)? {
            let dates = config.get_list(SCHEDULE_EVENTS_KEY)?;
            if dates.is_empty() {
                return Err(SimError::missing(SCHEDULE_EVENTS_KEY));
            }
            dates
                .iter()
                .map(|date| calendar.parse_date(date))
                .collect::<SimResult<Vec<_>>>()?
        } else {
            vec![t0]
        };

        for block in config.enabled_blocks("release")? {
            let params = config.block(&block);
            let mut process = registry.instantiate(params)?;
            process
                .load_parameters(ctx)
                .map_err(|err| SimError::instantiation(&block, err))?;
            self.processes.push((block, process));
        }
        if self.processes.is_empty() {
            return Err(SimError::Release("no release block is enabled".to_string()));
        }
        info!(
            events = self.events.len(),
            processes = self.processes.len(),
            "release setup [OK]"
        );
        Ok(())
    }

    /// Add a configured process directly.
    pub fn push(&mut self, key: &str, process: Box<dyn ReleaseProcess>) {
        self.processes.push((key.to_string(), process));
    }

    /// Replace the schedule. Instants keep the given order.
    pub fn set_events(&mut self, events: Vec<f64>) {
        self.events = events;
        self.reset();
    }

    /// Seconds between `t0` and the farthest scheduled instant.
    pub fn span(&self, t0: f64) -> f64 {
        self.events
            .iter()
            .map(|event| (event - t0).abs())
            .fold(0.0, f64::max)
    }

    /// Check that no instant precedes `t0` in the run direction and rewind the cursor.
    pub fn initialize(&mut self, t0: f64, direction: TimeDirection, calendar: Calendar) -> SimResult<()> {
        for &event in &self.events {
            let early = match direction {
                TimeDirection::Forward => event < t0,
                TimeDirection::Backward => event > t0,
            };
            if early {
                return Err(SimError::Release(format!(
                    "release event {} occurs before the simulation initial time {}",
                    calendar.format_date(event),
                    calendar.format_date(t0)
                )));
            }
        }
        self.reset();
        info!(events = self.events.len(), "release initialization [OK]");
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.released = 0;
    }

    pub fn events(&self) -> &[f64] {
        &self.events
    }

    /// Next event falling in the step window, if any.
    pub fn due(&self, time: f64, dt: f64) -> Option<ReleaseEvent> {
        let &event = self.events.get(self.cursor)?;
        in_step_window(event, time, dt).then_some(ReleaseEvent {
            index: self.cursor,
            time: event,
        })
    }

    /// Run every process for the event under the cursor and advance past it.
    pub fn fire(
        &mut self,
        event: ReleaseEvent,
        dataset: &dyn Dataset,
        zones: &ZoneIndex,
        first_index: usize,
    ) -> SimResult<Vec<Particle>> {
        if event.index != self.cursor {
            return Err(SimError::Release(format!(
                "release event {} fired out of order, expected {}",
                event.index, self.cursor
            )));
        }
        let mut particles = Vec::new();
        for (key, process) in &mut self.processes {
            let ctx = ReleaseContext {
                dataset,
                zones,
                event,
                first_index: first_index + particles.len(),
            };
            let batch = process.release(&ctx)?;
            debug!(process = %key, released = batch.len(), "release process done");
            particles.extend(batch);
        }
        self.cursor += 1;
        self.released += particles.len();
        info!(event = event.index, time = event.time, released = particles.len(), "Released {} particles", particles.len());
        Ok(particles)
    }

    pub fn is_all_released(&self) -> bool {
        self.cursor >= self.events.len()
    }

    pub fn released(&self) -> usize {
        self.released
    }
}
