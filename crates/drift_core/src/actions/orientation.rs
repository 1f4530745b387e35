//! Active swimming along a cardinal heading or against the current.

use std::fs::File;

use rand::distributions::Distribution;
use rand_chacha::ChaCha8Rng;

use crate::actions::{Action, SetupContext, StepContext};
use crate::config::BlockParameters;
use crate::dataset::GridPoint;
use crate::error::{SimError, SimResult};
use crate::kernels::heading::{cardinal_velocity, displacement_degrees, rheotaxis_velocity};
use crate::kernels::swim::{SpeedTable, SwimModel, SwimSpeed};
use crate::kernels::vonmises::VonMises;
use crate::particle::Particle;
use crate::rng::seeded_rng;
use crate::units::{seconds_to_days, ONE_DAY};

/// Parameters and state shared by the swimming behaviours.
struct Swimmer {
    key: String,
    model: Option<SwimModel>,
    noise: Option<VonMises>,
    age_min: f64,
    age_max: f64,
    pld_days: f64,
    rng: Option<ChaCha8Rng>,
}

impl Swimmer {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            model: None,
            noise: None,
            age_min: 0.0,
            age_max: f64::INFINITY,
            pld_days: 0.0,
            rng: None,
        }
    }

    fn load(&mut self, params: BlockParameters<'_>, seed: Option<u64>) -> SimResult<()> {
        let use_table = params.get_bool_or("swimming.speed.csv.enabled", false)?;
        self.model = Some(if use_table {
            let path = params.get_string("swimming.speed.csv.file")?;
            let file = File::open(&path).map_err(|err| {
                SimError::invalid(params.full_key("swimming.speed.csv.file"), &path, err.to_string())
            })?;
            SwimModel::Table(SpeedTable::from_reader(file)?)
        } else {
            SwimModel::Ontogenetic(SwimSpeed::new(
                params.get_f64("swimming.speed.hatch")?,
                params.get_f64("swimming.speed.settle")?,
            ))
        });
        // An unset concentration swims exactly along the heading.
        let kappa = params.get_f64_or("kappa", f64::INFINITY)?;
        self.noise = Some(
            VonMises::new(0.0, kappa)
                .map_err(|_| SimError::invalid(params.full_key("kappa"), kappa, "must be > 0"))?,
        );
        self.age_min = params.get_f64_or("age.min", 0.0)? * ONE_DAY as f64;
        self.age_max = params.get_f64_or("age.max", f64::INFINITY)? * ONE_DAY as f64;
        if self.age_max < self.age_min {
            return Err(SimError::action(
                &self.key,
                format!("age.max {} precedes age.min {}", self.age_max, self.age_min),
            ));
        }
        self.rng = Some(seeded_rng(seed, &self.key));
        Ok(())
    }

    fn init(&mut self, ctx: &StepContext<'_>) -> SimResult<()> {
        self.pld_days = seconds_to_days(ctx.transport_duration);
        // The growth curve divides by log10 of the larval duration.
        if matches!(self.model, Some(SwimModel::Ontogenetic(_))) && self.pld_days <= 1.0 {
            return Err(SimError::action(
                &self.key,
                format!(
                    "transport duration of {} day(s) is too short for an age-dependent swimming speed",
                    self.pld_days
                ),
            ));
        }
        Ok(())
    }

    fn is_active(&self, particle: &Particle) -> bool {
        particle.age >= self.age_min && particle.age < self.age_max
    }

    /// Speed in m/s and heading perturbation in radians.
    fn draw(&mut self, particle: &Particle) -> SimResult<(f64, f64)> {
        let (Some(model), Some(noise), Some(rng)) = (&self.model, &self.noise, self.rng.as_mut())
        else {
            return Err(SimError::action(&self.key, "parameters were never loaded"));
        };
        Ok((model.speed_at_age(particle.age, self.pld_days), noise.sample(rng)))
    }

    /// Queue the grid displacement produced by swimming at `(u, v)` m/s for one step.
    fn swim(&self, particle: &mut Particle, ctx: &StepContext<'_>, u: f64, v: f64) {
        let (d_lon, d_lat) = displacement_degrees(u, v, ctx.dt, particle.lat);
        let (x, y) = ctx
            .dataset
            .latlon_to_xy(particle.lat + d_lat, particle.lon + d_lon);
        particle.increment(x - particle.x, y - particle.y);
    }
}

/// Swimming towards a fixed compass heading (radians, 0 is east, counter-clockwise).
pub struct CardinalOrientation {
    swimmer: Swimmer,
    heading: f64,
}

impl CardinalOrientation {
    pub fn new(key: &str) -> Self {
        Self {
            swimmer: Swimmer::new(key),
            heading: 0.0,
        }
    }
}

impl Action for CardinalOrientation {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        let key = self.swimmer.key.clone();
        let params = ctx.config.block(&key);
        self.heading = params.get_f64("heading")?;
        self.swimmer.load(params, ctx.seed)
    }

    fn init(&mut self, _particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        self.swimmer.init(ctx)
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        if !self.swimmer.is_active(particle) {
            return Ok(());
        }
        let (speed, theta) = self.swimmer.draw(particle)?;
        let (u, v) = cardinal_velocity(speed, self.heading, theta);
        self.swimmer.swim(particle, ctx, u, v);
        Ok(())
    }
}

/// Swimming straight against the local current, never faster than it.
pub struct Rheotaxis {
    swimmer: Swimmer,
}

impl Rheotaxis {
    pub fn new(key: &str) -> Self {
        Self {
            swimmer: Swimmer::new(key),
        }
    }
}

impl Action for Rheotaxis {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        let key = self.swimmer.key.clone();
        let params = ctx.config.block(&key);
        self.swimmer.load(params, ctx.seed)
    }

    fn init(&mut self, _particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        self.swimmer.init(ctx)
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        if !self.swimmer.is_active(particle) {
            return Ok(());
        }
        let pos = GridPoint::new(particle.x, particle.y, particle.z);
        let current_u = ctx.dataset.get_u(&pos, ctx.time);
        let current_v = ctx.dataset.get_v(&pos, ctx.time);
        let (speed, theta) = self.swimmer.draw(particle)?;
        let (u, v) = rheotaxis_velocity(speed, current_u, current_v, theta);
        self.swimmer.swim(particle, ctx, u, v);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::dataset::{Dataset, UniformDataset};
    use crate::units::ONE_DEG_LATITUDE_IN_METER;
    use crate::zone::ZoneIndex;
    use serde_json::json;

    fn config(extra: serde_json::Value) -> Configuration {
        let mut config = Configuration::from_value(json!({
            "action.swim": {
                "swimming.speed.hatch": 2.0,
                "swimming.speed.settle": 12.0,
                "heading": 0.0
            }
        }))
        .unwrap();
        if let serde_json::Value::Object(map) = extra {
            for (key, value) in map {
                config.set(format!("action.swim.{key}"), value);
            }
        }
        config
    }

    fn load(action: &mut dyn Action, config: &Configuration) -> SimResult<()> {
        let mut zones = ZoneIndex::new();
        let mut trackers = Vec::new();
        let mut ctx = SetupContext {
            config,
            zones: &mut zones,
            trackers: &mut trackers,
            seed: Some(1),
        };
        action.load_parameters(&mut ctx)
    }

    fn step<'a>(dataset: &'a UniformDataset, zones: &'a ZoneIndex) -> StepContext<'a> {
        StepContext {
            dataset,
            zones,
            time: 0.0,
            dt: 3_600.0,
            transport_duration: 2.0 * 86_400.0,
            keep_drifting: false,
        }
    }

    #[test]
    fn cardinal_east_moves_longitude_only() {
        let dataset = UniformDataset::builder().resolution(0.01).size(100, 100).build();
        let zones = ZoneIndex::new();
        let ctx = step(&dataset, &zones);
        let mut action = CardinalOrientation::new("action.swim");
        load(&mut action, &config(json!({}))).unwrap();
        let mut particle = Particle::from_geo(0, &dataset, 0.5, 0.5, None).unwrap();
        action.init(&mut particle, &ctx).unwrap();
        action.execute(&mut particle, &ctx).unwrap();

        let speed = SwimSpeed::new(2.0, 12.0).speed_at_age(0.0, 2.0);
        let expected_lon = speed * 3_600.0
            / (ONE_DEG_LATITUDE_IN_METER * (std::f64::consts::PI * 0.5 / 180.0).cos());
        let [dx, dy, _] = particle.pending_move();
        let (lat, lon) = dataset.xy_to_latlon(particle.x + dx, particle.y + dy);
        assert!((lon - 0.5 - expected_lon).abs() < 1e-12);
        assert!((lat - 0.5).abs() < 1e-12);
    }

    #[test]
    fn age_window_gates_swimming() {
        let dataset = UniformDataset::builder().build();
        let zones = ZoneIndex::new();
        let ctx = step(&dataset, &zones);
        let mut action = CardinalOrientation::new("action.swim");
        load(&mut action, &config(json!({"age.min": 1.0, "age.max": 2.0}))).unwrap();
        let mut particle = Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap();
        action.init(&mut particle, &ctx).unwrap();
        action.execute(&mut particle, &ctx).unwrap();
        assert_eq!(particle.pending_move(), [0.0; 3]);
        particle.age = 1.5 * 86_400.0;
        action.execute(&mut particle, &ctx).unwrap();
        assert!(particle.pending_move()[0] > 0.0);
        particle.take_pending_move();
        particle.age = 2.0 * 86_400.0;
        action.execute(&mut particle, &ctx).unwrap();
        assert_eq!(particle.pending_move(), [0.0; 3]);
    }

    #[test]
    fn rheotaxis_swims_upstream() {
        let dataset = UniformDataset::builder().current(0.5, 0.0).build();
        let zones = ZoneIndex::new();
        let ctx = step(&dataset, &zones);
        let mut action = Rheotaxis::new("action.swim");
        load(&mut action, &config(json!({}))).unwrap();
        let mut particle = Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap();
        action.init(&mut particle, &ctx).unwrap();
        action.execute(&mut particle, &ctx).unwrap();
        let [dx, dy, _] = particle.pending_move();
        assert!(dx < 0.0);
        assert!(dy.abs() < 1e-12);
    }

    #[test]
    fn one_day_transport_rejects_the_growth_curve() {
        let dataset = UniformDataset::builder().build();
        let zones = ZoneIndex::new();
        let ctx = StepContext {
            transport_duration: 86_400.0,
            ..step(&dataset, &zones)
        };
        let mut action = CardinalOrientation::new("action.swim");
        load(&mut action, &config(json!({}))).unwrap();
        let mut particle = Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap();
        assert!(matches!(
            action.init(&mut particle, &ctx),
            Err(SimError::Action { .. })
        ));
    }

    #[test]
    fn invalid_kappa_is_a_configuration_error() {
        let mut action = CardinalOrientation::new("action.swim");
        let err = load(&mut action, &config(json!({"kappa": 0.0}))).unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { ref key, .. } if key == "action.swim.kappa"));
    }

    #[test]
    fn missing_speeds_are_reported() {
        let mut config = config(json!({}));
        config.set("action.swim.swimming.speed.hatch", serde_json::Value::Null);
        let mut action = CardinalOrientation::new("action.swim");
        assert!(matches!(
            load(&mut action, &config),
            Err(SimError::MissingParameter { .. })
        ));
    }
}
