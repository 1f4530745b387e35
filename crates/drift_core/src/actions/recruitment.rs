//! Recruitment of old enough particles that linger in a recruitment zone.

use tracing::info;

use crate::actions::{Action, SetupContext, StepContext};
use crate::error::{SimError, SimResult};
use crate::particle::Particle;
use crate::units::ONE_DAY;

/// Particle attributes maintained by the recruitment action.
pub const RECRUITED: &str = "recruited";
pub const RECRUITED_ZONE: &str = "recruited_zone";
const CANDIDATE_ZONE: &str = "recruitment_candidate_zone";
const TIME_IN_ZONE: &str = "recruitment_time_in_zone";

pub struct ZoneRecruitment {
    key: String,
    prefix: String,
    /// Seconds.
    age_min: f64,
    /// Seconds.
    duration_min: f64,
    stop_moving: bool,
}

impl ZoneRecruitment {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            prefix: "recruitment".to_string(),
            age_min: 0.0,
            duration_min: 0.0,
            stop_moving: false,
        }
    }

    pub fn is_recruited(particle: &Particle) -> bool {
        particle.attribute(RECRUITED).is_some_and(|flag| flag > 0.0)
    }
}

impl Action for ZoneRecruitment {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        let params = ctx.config.block(&self.key);
        let criterion = params.get_string_or("criterion", "age")?;
        if !criterion.to_ascii_lowercase().starts_with("age") {
            return Err(SimError::action(
                &self.key,
                format!("recruitment criterion {criterion:?} is not supported, only age"),
            ));
        }
        self.prefix = params.get_string_or("zone_prefix", "recruitment")?;
        self.age_min = params.get_f64_or("limit_age", 0.0)? * ONE_DAY as f64;
        self.duration_min = params.get_f64_or("duration_min", 0.0)? * ONE_DAY as f64;
        self.stop_moving = params.get_bool_or("stop_moving", false)?;
        let zone_tracker = params.get_bool_or("zone_tracker", true)?;
        let recruited_tracker = params.get_bool_or("recruited_tracker", true)?;

        ctx.zones.load_zones(ctx.config, &self.prefix)?;
        if ctx.zones.zones(&self.prefix).next().is_none() {
            return Err(SimError::action(
                &self.key,
                format!("no enabled zone under prefix {}", self.prefix),
            ));
        }
        if zone_tracker {
            ctx.request_tracker(format!("zone:{}", self.prefix));
        }
        if recruited_tracker {
            ctx.request_tracker(RECRUITED);
            ctx.request_tracker(RECRUITED_ZONE);
        }
        info!(block = %self.key, prefix = %self.prefix, "recruitment ready");
        Ok(())
    }

    fn init(&mut self, particle: &mut Particle, _ctx: &StepContext<'_>) -> SimResult<()> {
        particle.set_attribute(RECRUITED, 0.0);
        particle.set_attribute(RECRUITED_ZONE, -1.0);
        Ok(())
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        if self.stop_moving && Self::is_recruited(particle) {
            particle.locked = true;
            return Ok(());
        }
        let Some(zone) = ctx
            .zones
            .find_zones(particle, ctx.dataset, Some(&self.prefix))
            .first()
            .copied()
        else {
            return Ok(());
        };
        if particle.attribute(RECRUITED_ZONE) == Some(zone) || particle.age < self.age_min {
            return Ok(());
        }
        let time_in_zone = if particle.attribute(CANDIDATE_ZONE) == Some(zone) {
            particle.attribute(TIME_IN_ZONE).unwrap_or(0.0) + ctx.dt.abs()
        } else {
            0.0
        };
        particle.set_attribute(CANDIDATE_ZONE, zone);
        particle.set_attribute(TIME_IN_ZONE, time_in_zone);
        if time_in_zone >= self.duration_min {
            particle.set_attribute(RECRUITED, 1.0);
            particle.set_attribute(RECRUITED_ZONE, zone);
        }
        Ok(())
    }
}
