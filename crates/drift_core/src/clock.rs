use tracing::info;

use crate::calendar::{format_duration, parse_duration, Calendar};
use crate::config::Configuration;
use crate::error::{SimError, SimResult};

pub const INITIAL_TIME_KEY: &str = "app.time.initial_time";
pub const TIME_STEP_KEY: &str = "app.time.time_step";
pub const TIME_ARROW_KEY: &str = "app.time.time_arrow";
pub const TRANSPORT_DURATION_KEY: &str = "app.time.transport_duration";
pub const KEEP_DRIFTING_KEY: &str = "app.time.keep_drifting";
pub const CALENDAR_KEY: &str = "app.time.calendar";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeDirection {
    Forward,
    Backward,
}

impl TimeDirection {
    /// `+1` forward, `-1` backward.
    pub fn sign(self) -> f64 {
        match self {
            TimeDirection::Forward => 1.0,
            TimeDirection::Backward => -1.0,
        }
    }
}

/// Outcome of advancing the clock by one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// The new instant is still inside the run; a NextStep follows.
    Next,
    /// The run has elapsed; a LastStep follows.
    Last,
}

/// Signed time stepping over `[t0, t0 ± duration)`.
#[derive(Clone, Debug)]
pub struct TimeClock {
    calendar: Calendar,
    t0: f64,
    dt: i64,
    transport_duration: f64,
    keep_drifting: bool,
    duration: f64,
    time: f64,
    step_index: usize,
}

impl TimeClock {
    /// `time_step` is the magnitude of the step in seconds; its sign comes from `direction`.
    pub fn new(
        calendar: Calendar,
        t0: f64,
        time_step: i64,
        direction: TimeDirection,
        transport_duration: f64,
    ) -> SimResult<Self> {
        if time_step <= 0 {
            return Err(SimError::invalid(
                TIME_STEP_KEY,
                time_step,
                "time step must be a positive number of seconds",
            ));
        }
        if transport_duration < 0.0 {
            return Err(SimError::invalid(
                TRANSPORT_DURATION_KEY,
                transport_duration,
                "transport duration must not be negative",
            ));
        }
        let dt = match direction {
            TimeDirection::Forward => time_step,
            TimeDirection::Backward => -time_step,
        };
        Ok(Self {
            calendar,
            t0,
            dt,
            transport_duration,
            keep_drifting: false,
            duration: transport_duration,
            time: t0,
            step_index: 0,
        })
    }

    /// Parse the `app.time.*` parameters.
    pub fn from_config(config: &Configuration) -> SimResult<Self> {
        let calendar = if config.is_null(CALENDAR_KEY) {
            Calendar::default()
        } else {
            Calendar::from_name(&config.get_string(CALENDAR_KEY)?)?
        };
        let t0 = calendar.parse_date(&config.get_string(INITIAL_TIME_KEY)?)?;
        let time_step = config.get_i64(TIME_STEP_KEY)?;
        let direction = match config
            .get_string_or(TIME_ARROW_KEY, "forward")?
            .to_ascii_lowercase()
            .as_str()
        {
            "forward" => TimeDirection::Forward,
            "backward" => TimeDirection::Backward,
            other => {
                return Err(SimError::invalid(
                    TIME_ARROW_KEY,
                    other,
                    "expected forward or backward",
                ))
            }
        };
        let transport = parse_duration(&config.get_string(TRANSPORT_DURATION_KEY)?)
            .map_err(|err| match err {
                SimError::InvalidParameter { value, reason, .. } => SimError::InvalidParameter {
                    key: TRANSPORT_DURATION_KEY.to_string(),
                    value,
                    reason,
                },
                other => other,
            })?;
        let clock = Self::new(calendar, t0, time_step, direction, transport)?
            .with_keep_drifting(config.get_bool_or(KEEP_DRIFTING_KEY, false)?);
        info!(
            initial_time = %calendar.format_date(t0),
            dt = clock.dt,
            transport = %format_duration(transport),
            "time setup [OK]"
        );
        Ok(clock)
    }

    pub fn with_keep_drifting(mut self, keep_drifting: bool) -> Self {
        self.keep_drifting = keep_drifting;
        self
    }

    /// Fix the run duration once the release span is known and rewind to `t0`.
    pub fn initialize(&mut self, release_span: f64) {
        self.duration = self.transport_duration + release_span.abs();
        self.time = self.t0;
        self.step_index = 0;
        info!(
            duration = %format_duration(self.duration),
            steps = self.step_count(),
            "time initialization [OK]"
        );
    }

    /// Move the clock by `dt` and report whether the run continues.
    pub fn advance(&mut self) -> Tick {
        self.time += self.dt as f64;
        if (self.time - self.t0).abs() < self.duration {
            Tick::Next
        } else {
            Tick::Last
        }
    }

    /// Count one completed NextStep.
    pub fn mark_step(&mut self) {
        self.step_index += 1;
    }

    /// Whole steps between `t0` and the current instant.
    pub fn elapsed_steps(&self) -> usize {
        ((self.time - self.t0) / self.dt as f64).abs().round() as usize
    }

    pub fn step_count(&self) -> usize {
        (self.duration / self.dt as f64).abs().floor() as usize
    }

    pub fn progress(&self) -> f64 {
        let count = self.step_count();
        if count == 0 {
            1.0
        } else {
            (self.step_index as f64 / count as f64).min(1.0)
        }
    }

    pub fn time_to_string(&self) -> String {
        self.calendar.format_date(self.time)
    }

    pub fn step_to_string(&self) -> String {
        format!("Step {} / {}", self.step_index, self.step_count())
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn dt(&self) -> i64 {
        self.dt
    }

    pub fn direction(&self) -> TimeDirection {
        if self.dt < 0 {
            TimeDirection::Backward
        } else {
            TimeDirection::Forward
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn transport_duration(&self) -> f64 {
        self.transport_duration
    }

    pub fn keep_drifting(&self) -> bool {
        self.keep_drifting
    }
}
