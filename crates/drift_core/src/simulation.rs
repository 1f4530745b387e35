//! The orchestrator: owns every subsystem and drives the lifecycle phases.
//!
//! Subsystems are registered on the [`LifecycleBus`] in a fixed order (dataset,
//! release, time, action, zone, output). Setup, Initialize and NextStep visit
//! them last-registered first; LastStep and Release visit them in registration
//! order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::actions::{self, ActionPipeline, ActionRegistry, SetupContext, StepContext};
use crate::bus::{LifecycleBus, Phase};
use crate::clock::{Tick, TimeClock};
use crate::config::Configuration;
use crate::dataset::{self, Dataset, DatasetRegistry};
use crate::error::{SimError, SimResult};
use crate::output::{OutputManager, OutputSink, Snapshot};
use crate::particle::Particle;
use crate::release::{self, ReleaseEvent, ReleaseRegistry, ReleaseScheduler};
use crate::rng::SEED_KEY;
use crate::zone::ZoneIndex;

/// Listener handles registered on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsystem {
    Dataset,
    Release,
    Time,
    Action,
    Zone,
    Output,
}

impl Subsystem {
    /// Registration order and subscribed phases.
    const REGISTRATION: [(Subsystem, &'static [Phase]); 6] = [
        (
            Subsystem::Dataset,
            &[Phase::Setup, Phase::Initialize, Phase::NextStep],
        ),
        (
            Subsystem::Release,
            &[Phase::Setup, Phase::Initialize, Phase::NextStep, Phase::Release],
        ),
        (
            Subsystem::Time,
            &[Phase::Setup, Phase::Initialize, Phase::LastStep],
        ),
        (Subsystem::Action, &[Phase::Setup, Phase::Initialize]),
        (Subsystem::Zone, &[Phase::Setup, Phase::Initialize]),
        (
            Subsystem::Output,
            &[Phase::Setup, Phase::Initialize, Phase::NextStep, Phase::LastStep],
        ),
    ];
}

/// Factories for the configurable block types.
pub struct Registries {
    pub datasets: DatasetRegistry,
    pub actions: ActionRegistry,
    pub releases: ReleaseRegistry,
}

impl Default for Registries {
    fn default() -> Self {
        Self {
            datasets: dataset::default_registry(),
            actions: actions::default_registry(),
            releases: release::default_registry(),
        }
    }
}

/// Cooperative stop request shared with other threads.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// NextStep dispatches after the first one.
    pub steps: usize,
    pub released: usize,
    pub alive: usize,
    /// Dead particles per mortality code.
    pub dead: BTreeMap<i32, usize>,
    pub records: usize,
    pub interrupted: bool,
}

/// Per-run state owned by one simulation.
pub struct SimulationContext {
    pub config: Configuration,
    pub dataset: Box<dyn Dataset>,
    pub clock: Option<TimeClock>,
    pub zones: ZoneIndex,
    pub release: ReleaseScheduler,
    pub pipeline: ActionPipeline,
    pub output: OutputManager,
    pub particles: Vec<Particle>,
    /// Output trackers requested during setup.
    pub trackers: Vec<String>,
    pub seed: Option<u64>,
}

impl SimulationContext {
    pub fn clock(&self) -> SimResult<&TimeClock> {
        self.clock
            .as_ref()
            .ok_or_else(|| SimError::missing(crate::clock::INITIAL_TIME_KEY))
    }
}

pub struct Simulation {
    ctx: SimulationContext,
    registries: Registries,
    bus: LifecycleBus<Subsystem>,
    stop: StopHandle,
    pending_release: Option<ReleaseEvent>,
    interrupted: bool,
    finished: bool,
}

impl Simulation {
    /// Simulation over an injected dataset with the default registries.
    pub fn new(config: Configuration, dataset: Box<dyn Dataset>, sink: Box<dyn OutputSink>) -> Self {
        Self::assemble(config, dataset, Registries::default(), sink)
    }

    /// Simulation whose dataset is built from the single enabled `dataset.*` block.
    pub fn with_registry(
        config: Configuration,
        registries: Registries,
        sink: Box<dyn OutputSink>,
    ) -> SimResult<Self> {
        let dataset = dataset::from_config(&config, &registries.datasets)?;
        Ok(Self::assemble(config, dataset, registries, sink))
    }

    pub fn from_config(config: Configuration, sink: Box<dyn OutputSink>) -> SimResult<Self> {
        Self::with_registry(config, Registries::default(), sink)
    }

    fn assemble(
        config: Configuration,
        dataset: Box<dyn Dataset>,
        registries: Registries,
        sink: Box<dyn OutputSink>,
    ) -> Self {
        let mut bus = LifecycleBus::new();
        for (subsystem, phases) in Subsystem::REGISTRATION {
            bus.register(subsystem, phases);
        }
        Self {
            ctx: SimulationContext {
                config,
                dataset,
                clock: None,
                zones: ZoneIndex::new(),
                release: ReleaseScheduler::new(),
                pipeline: ActionPipeline::new(),
                output: OutputManager::new(sink),
                particles: Vec::new(),
                trackers: Vec::new(),
                seed: None,
            },
            registries,
            bus,
            stop: StopHandle::default(),
            pending_release: None,
            interrupted: false,
            finished: false,
        }
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn particles(&self) -> &[Particle] {
        &self.ctx.particles
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a stop. The current step completes, then LastStep runs.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reset the per-run tables and let every subsystem parse its configuration.
    pub fn setup(&mut self) -> SimResult<()> {
        self.ctx.zones.clear();
        self.ctx.particles.clear();
        self.ctx.trackers.clear();
        self.ctx.clock = None;
        self.pending_release = None;
        self.interrupted = false;
        self.finished = false;
        self.ctx.seed = if self.ctx.config.is_null(SEED_KEY) {
            None
        } else {
            let seed = self.ctx.config.get_i64(SEED_KEY)?;
            Some(u64::try_from(seed).map_err(|_| {
                SimError::invalid(SEED_KEY, seed, "seed must not be negative")
            })?)
        };
        self.dispatch(Phase::Setup)?;
        info!("simulation setup [OK]");
        Ok(())
    }

    pub fn init(&mut self) -> SimResult<()> {
        self.dispatch(Phase::Initialize)?;
        info!("simulation initialization [OK]");
        Ok(())
    }

    /// NextStep at the initial time, before any particle moves.
    pub fn first_step(&mut self) -> SimResult<()> {
        self.dispatch(Phase::NextStep)
    }

    /// Move every living particle, advance the clock and dispatch the next phase.
    /// Returns whether more steps remain.
    pub fn step(&mut self) -> SimResult<bool> {
        if self.finished {
            return Ok(false);
        }
        if self.stop.is_stopped() {
            self.interrupted = true;
            self.last_step()?;
            return Ok(false);
        }
        self.step_particles()?;
        let clock = self
            .ctx
            .clock
            .as_mut()
            .ok_or_else(|| SimError::missing(crate::clock::INITIAL_TIME_KEY))?;
        let tick = clock.advance();
        debug!(step = %clock.step_to_string(), time = %clock.time_to_string(), "step done");
        match tick {
            Tick::Next => {
                // The index advances once NextStep listeners have run.
                self.dispatch(Phase::NextStep)?;
                if let Some(clock) = self.ctx.clock.as_mut() {
                    clock.mark_step();
                }
                Ok(true)
            }
            Tick::Last => {
                self.last_step()?;
                Ok(false)
            }
        }
    }

    /// Setup, initialization, then steps until the run elapses or is stopped.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.setup()?;
        self.init()?;
        self.first_step()?;
        while self.step()? {}
        Ok(self.summary())
    }

    pub fn summary(&self) -> RunSummary {
        let mut dead = BTreeMap::new();
        for particle in self.ctx.particles.iter().filter(|p| !p.is_living()) {
            *dead.entry(particle.mortality().code()).or_insert(0) += 1;
        }
        RunSummary {
            steps: self.ctx.clock.as_ref().map_or(0, TimeClock::elapsed_steps),
            released: self.ctx.release.released(),
            alive: self.ctx.particles.iter().filter(|p| p.is_living()).count(),
            dead,
            records: self.ctx.output.records(),
            interrupted: self.interrupted,
        }
    }

    fn last_step(&mut self) -> SimResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.dispatch(Phase::LastStep)
    }

    fn step_particles(&mut self) -> SimResult<()> {
        let ctx = &mut self.ctx;
        let clock = ctx
            .clock
            .as_ref()
            .ok_or_else(|| SimError::missing(crate::clock::INITIAL_TIME_KEY))?;
        let step = step_context(clock, ctx.dataset.as_ref(), &ctx.zones);
        for particle in ctx.particles.iter_mut().filter(|p| p.is_living()) {
            ctx.pipeline.execute(particle, &step)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, phase: Phase) -> SimResult<()> {
        let bus = self.bus.clone();
        bus.dispatch(phase, |subsystem| self.handle(subsystem, phase))
    }

    fn handle(&mut self, subsystem: Subsystem, phase: Phase) -> SimResult<()> {
        match (subsystem, phase) {
            (Subsystem::Dataset, Phase::Setup) => self.ctx.dataset.set_up(&self.ctx.config),
            (Subsystem::Dataset, Phase::Initialize) => self.ctx.dataset.init(),
            (Subsystem::Dataset, Phase::NextStep) => {
                let time = self.ctx.clock()?.time();
                self.ctx.dataset.next_step(time)
            }

            (Subsystem::Release, Phase::Setup) => {
                let ctx = &mut self.ctx;
                let clock = ctx.clock()?;
                let (calendar, t0) = (clock.calendar(), clock.t0());
                ctx.release.setup(
                    &mut SetupContext {
                        config: &ctx.config,
                        zones: &mut ctx.zones,
                        trackers: &mut ctx.trackers,
                        seed: ctx.seed,
                    },
                    &self.registries.releases,
                    calendar,
                    t0,
                )
            }
            (Subsystem::Release, Phase::Initialize) => {
                let clock = self.ctx.clock()?;
                let (t0, direction, calendar) = (clock.t0(), clock.direction(), clock.calendar());
                self.ctx.release.initialize(t0, direction, calendar)
            }
            (Subsystem::Release, Phase::NextStep) => {
                let clock = self.ctx.clock()?;
                let (time, dt) = (clock.time(), clock.dt() as f64);
                while let Some(event) = self.ctx.release.due(time, dt) {
                    self.pending_release = Some(event);
                    self.dispatch(Phase::Release)?;
                }
                Ok(())
            }
            (Subsystem::Release, Phase::Release) => self.release(),

            (Subsystem::Time, Phase::Setup) => {
                self.ctx.clock = Some(TimeClock::from_config(&self.ctx.config)?);
                Ok(())
            }
            (Subsystem::Time, Phase::Initialize) => {
                let ctx = &mut self.ctx;
                let t0 = ctx.clock()?.t0();
                let span = ctx.release.span(t0);
                if let Some(clock) = ctx.clock.as_mut() {
                    clock.initialize(span);
                }
                Ok(())
            }
            (Subsystem::Time, Phase::LastStep) => {
                let clock = self.ctx.clock()?;
                info!(
                    step = %clock.step_to_string(),
                    time = %clock.time_to_string(),
                    interrupted = self.interrupted,
                    "simulation done"
                );
                Ok(())
            }

            (Subsystem::Action, Phase::Setup) => {
                let ctx = &mut self.ctx;
                ctx.pipeline.setup(
                    &mut SetupContext {
                        config: &ctx.config,
                        zones: &mut ctx.zones,
                        trackers: &mut ctx.trackers,
                        seed: ctx.seed,
                    },
                    &self.registries.actions,
                )
            }
            (Subsystem::Action, Phase::Initialize) => {
                info!(actions = ?self.ctx.pipeline.order(), "action initialization [OK]");
                Ok(())
            }

            (Subsystem::Zone, Phase::Setup) => {
                info!(prefixes = ?self.ctx.zones.prefixes(), "zone setup [OK]");
                Ok(())
            }
            (Subsystem::Zone, Phase::Initialize) => {
                let ctx = &mut self.ctx;
                ctx.zones.initialize(ctx.dataset.as_ref())
            }

            (Subsystem::Output, Phase::Setup) => self.ctx.output.setup(&self.ctx.config),
            (Subsystem::Output, Phase::Initialize) => {
                let ctx = &mut self.ctx;
                ctx.output
                    .initialize(ctx.dataset.as_ref(), &ctx.zones, &ctx.trackers)
            }
            (Subsystem::Output, Phase::NextStep) => {
                let ctx = &mut self.ctx;
                let clock = ctx.clock()?;
                let date = clock.time_to_string();
                let snapshot = Snapshot {
                    step: clock.elapsed_steps(),
                    time: clock.time(),
                    date: &date,
                    particles: &ctx.particles,
                    dataset: ctx.dataset.as_ref(),
                    zones: &ctx.zones,
                };
                ctx.output.next_step(&snapshot)
            }
            (Subsystem::Output, Phase::LastStep) => {
                let interrupted = self.interrupted;
                let ctx = &mut self.ctx;
                let clock = ctx.clock()?;
                let date = clock.time_to_string();
                let snapshot = Snapshot {
                    step: clock.elapsed_steps(),
                    time: clock.time(),
                    date: &date,
                    particles: &ctx.particles,
                    dataset: ctx.dataset.as_ref(),
                    zones: &ctx.zones,
                };
                ctx.output.last_step(&snapshot, interrupted)
            }

            (subsystem, phase) => {
                debug!(?subsystem, ?phase, "no handler");
                Ok(())
            }
        }
    }

    /// Create the particles of the pending release event.
    fn release(&mut self) -> SimResult<()> {
        let Some(event) = self.pending_release.take() else {
            return Ok(());
        };
        let ctx = &mut self.ctx;
        let clock = ctx
            .clock
            .as_ref()
            .ok_or_else(|| SimError::missing(crate::clock::INITIAL_TIME_KEY))?;
        let particles = ctx.release.fire(
            event,
            ctx.dataset.as_ref(),
            &ctx.zones,
            ctx.particles.len(),
        )?;
        let step = step_context(clock, ctx.dataset.as_ref(), &ctx.zones);
        for mut particle in particles {
            ctx.pipeline.init_particle(&mut particle, &step)?;
            ctx.particles.push(particle);
        }
        Ok(())
    }
}

fn step_context<'a>(clock: &TimeClock, dataset: &'a dyn Dataset, zones: &'a ZoneIndex) -> StepContext<'a> {
    StepContext {
        dataset,
        zones,
        time: clock.time(),
        dt: clock.dt() as f64,
        transport_duration: clock.transport_duration(),
        keep_drifting: clock.keep_drifting(),
    }
}
