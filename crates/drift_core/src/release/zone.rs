use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::actions::SetupContext;
use crate::error::{SimError, SimResult};
use crate::particle::Particle;
use crate::release::{ReleaseContext, ReleaseProcess};
use crate::rng::seeded_rng;
use crate::zone::Zone;

/// Rejection-sampling attempts before a zone is declared unusable.
const DROP_MAX: usize = 2_000;

/// Releases a fixed number of particles spread over the zones of one prefix.
pub struct ZoneRelease {
    key: String,
    prefix: String,
    particles: usize,
    rng: Option<ChaCha8Rng>,
}

impl ZoneRelease {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            prefix: "release".to_string(),
            particles: 0,
            rng: None,
        }
    }
}

/// Share `total` between zones proportionally to `weights`, rounding each share
/// and spreading the remainder one particle at a time from the first zone.
/// Shares always add up to `total`.
pub fn dispatch(total: usize, weights: &[f64]) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let sum: f64 = weights.iter().sum();
    let mut shares: Vec<usize> = weights
        .iter()
        .map(|weight| {
            if sum > 0.0 {
                (total as f64 * weight / sum).round() as usize
            } else {
                0
            }
        })
        .collect();
    let mut assigned: usize = shares.iter().sum();
    let n = shares.len();
    let mut k = 0;
    while assigned != total {
        let share = &mut shares[k % n];
        if assigned < total {
            *share += 1;
            assigned += 1;
        } else if *share > 0 {
            // Empty zones cannot give a particle back.
            *share -= 1;
            assigned -= 1;
        }
        k += 1;
    }
    shares
}

impl ZoneRelease {
    fn weights(&self, zones: &[&Zone], ctx: &ReleaseContext<'_>) -> Vec<f64> {
        if zones.iter().all(|zone| zone.proportion.is_some()) {
            zones.iter().filter_map(|zone| zone.proportion).collect()
        } else {
            zones.iter().map(|zone| zone.area_km2(ctx.dataset)).collect()
        }
    }

    fn drop_in(&mut self, zone: &Zone, index: usize, ctx: &ReleaseContext<'_>) -> SimResult<Particle> {
        let bbox = zone
            .bbox()
            .ok_or_else(|| SimError::zone(&zone.key, "zone was never initialized"))?;
        let rng = self
            .rng
            .as_mut()
            .ok_or_else(|| SimError::Release(format!("{} parameters were never loaded", self.key)))?;
        let is_3d = ctx.dataset.is_3d();
        for _ in 0..DROP_MAX {
            let x = bbox.x_min + rng.gen::<f64>() * (bbox.x_max - bbox.x_min);
            let y = bbox.y_min + rng.gen::<f64>() * (bbox.y_max - bbox.y_min);
            let depth = if is_3d {
                let mask = zone.depth_mask();
                let (upper, lower) = mask.map_or((0.0, 0.0), |mask| (mask.upper, mask.lower));
                Some(-(upper + rng.gen::<f64>() * (lower - upper)))
            } else {
                None
            };
            if !zone.contains_grid_point(x, y, ctx.dataset) {
                continue;
            }
            if let Some(particle) = Particle::from_grid(index, ctx.dataset, x, y, depth) {
                return Ok(particle);
            }
        }
        Err(SimError::Release(format!(
            "unable to release a particle in zone {} after {DROP_MAX} attempts, check the zone definition",
            zone.key
        )))
    }
}

impl ReleaseProcess for ZoneRelease {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        let params = ctx.config.block(&self.key);
        let particles = params.get_i64("number_particles")?;
        if particles <= 0 {
            return Err(SimError::invalid(
                params.full_key("number_particles"),
                particles,
                "must be positive",
            ));
        }
        self.particles = particles as usize;
        self.prefix = params.get_string_or("zone_prefix", "release")?;
        ctx.zones.load_zones(ctx.config, &self.prefix)?;
        if ctx.zones.zones(&self.prefix).next().is_none() {
            return Err(SimError::Release(format!(
                "no enabled release zone under prefix {}",
                self.prefix
            )));
        }
        ctx.request_tracker(format!("zone:{}", self.prefix));
        self.rng = Some(seeded_rng(ctx.seed, &self.key));
        info!(block = %self.key, particles = self.particles, prefix = %self.prefix, "zone release ready");
        Ok(())
    }

    fn release(&mut self, ctx: &ReleaseContext<'_>) -> SimResult<Vec<Particle>> {
        let prefix = self.prefix.clone();
        let zones: Vec<&Zone> = ctx.zones.zones(&prefix).collect();
        let shares = dispatch(self.particles, &self.weights(&zones, ctx));
        let mut particles = Vec::with_capacity(self.particles);
        for (zone, share) in zones.iter().zip(shares) {
            if share == 0 {
                warn!(zone = %zone.key, "release zone has not been attributed any particle");
            }
            for _ in 0..share {
                let particle = self.drop_in(zone, ctx.first_index + particles.len(), ctx)?;
                particles.push(particle);
            }
        }
        Ok(particles)
    }
}
