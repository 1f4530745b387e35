use tracing::{info, warn};

use crate::actions::{Action, SetupContext, StepContext};
use crate::dataset::Dataset;
use crate::error::SimResult;
use crate::particle::{Mortality, Particle};

pub const COASTLINE_KEY: &str = "app.transport.coastline_behavior";

const BOUNCE_BISECTIONS: usize = 1_000;
const BOUNCE_RETRIES: usize = 10;

/// Ages particles and retires them once the transport duration has elapsed.
#[derive(Clone, Copy, Debug, Default)]
pub struct AgeMonitoring;

impl Action for AgeMonitoring {
    fn load_parameters(&mut self, _ctx: &mut SetupContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        if !ctx.keep_drifting && particle.age > ctx.transport_duration {
            particle.kill(Mortality::Old);
        } else {
            particle.age += ctx.dt.abs();
        }
        Ok(())
    }
}

/// What happens to a move that ends ashore.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Coastline {
    /// The move is applied as is.
    None,
    /// The particle is killed once ashore.
    #[default]
    Beaching,
    /// The move is reflected off the coast.
    Bouncing,
    /// The move is cancelled.
    Standstill,
}

impl Coastline {
    /// Unknown names fall back to beaching.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Coastline::None,
            "bouncing" => Coastline::Bouncing,
            "standstill" => Coastline::Standstill,
            "beaching" => Coastline::Beaching,
            other => {
                warn!(behavior = other, "unknown coastline behavior, beaching instead");
                Coastline::Beaching
            }
        }
    }
}

/// Applies the displacement queued by the ordinary actions.
#[derive(Clone, Copy, Debug, Default)]
pub struct Move {
    coastline: Coastline,
}

impl Move {
    pub fn new(coastline: Coastline) -> Self {
        Self { coastline }
    }

    fn apply(&self, particle: &mut Particle, dataset: &dyn Dataset) {
        let [mut dx, mut dy, dz] = particle.take_pending_move();
        match self.coastline {
            Coastline::None | Coastline::Beaching => {}
            Coastline::Bouncing => {
                (dx, dy) = bounce(dataset, particle.x, particle.y, dx, dy);
            }
            Coastline::Standstill => {
                if !dataset.is_in_water(particle.x + dx, particle.y + dy) {
                    dx = 0.0;
                    dy = 0.0;
                }
            }
        }
        particle.previous_lon = particle.lon;
        particle.previous_lat = particle.lat;
        particle.x += dx;
        particle.y += dy;
        if let Some(z) = particle.z.as_mut() {
            *z += dz;
        }
        if self.coastline == Coastline::Beaching && !dataset.is_in_water(particle.x, particle.y) {
            particle.kill(Mortality::Beached);
        }
    }
}

impl Action for Move {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        self.coastline = if ctx.config.is_null(COASTLINE_KEY) {
            Coastline::default()
        } else {
            Coastline::from_name(&ctx.config.get_string(COASTLINE_KEY)?)
        };
        info!(coastline = ?self.coastline, "move action ready");
        Ok(())
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        if particle.locked {
            particle.take_pending_move();
            return Ok(());
        }
        self.apply(particle, ctx.dataset);
        if ctx.dataset.is_on_edge(particle.x, particle.y) {
            particle.kill(Mortality::OutOfDomain);
            return Ok(());
        }
        let (lat, lon) = ctx.dataset.xy_to_latlon(particle.x, particle.y);
        particle.lat = lat;
        particle.lon = lon;
        if let Some(z) = particle.z {
            particle.depth = Some(ctx.dataset.z_to_depth(particle.x, particle.y, z));
        }
        Ok(())
    }
}

/// Reflect the move `(dx, dy)` from `(x, y)` off the first coastline cell face it crosses.
pub fn bounce(dataset: &dyn Dataset, x: f64, y: f64, dx: f64, dy: f64) -> (f64, f64) {
    let (mut dx, mut dy) = (dx, dy);
    for _ in 0..BOUNCE_RETRIES {
        if dataset.is_in_water(x + dx, y + dy) {
            break;
        }
        // Bisect along the move until the path sits on a cell face.
        let (mut t, mut step, mut direction) = (0.0f64, 1.0f64, 1.0f64);
        let (mut meridional, mut zonal) = (false, false);
        let mut n = 0;
        while n < BOUNCE_BISECTIONS && !(meridional || zonal) {
            step *= 0.5;
            t += direction * step;
            let (xs, ys) = (x + t * dx, y + t * dy);
            direction = if dataset.is_in_water(xs, ys) { 1.0 } else { -1.0 };
            meridional = dx != 0.0 && on_cell_face(xs);
            zonal = dy != 0.0 && on_cell_face(ys);
            n += 1;
        }
        let dx1 = x.round() + dx.signum() * 0.5 - x;
        let dy1 = y.round() + dy.signum() * 0.5 - y;
        if meridional {
            dx = 2.0 * dx1 - dx;
        }
        if zonal {
            dy = 2.0 * dy1 - dy;
        }
        if !(meridional || zonal) {
            break;
        }
    }
    (dx, dy)
}

fn on_cell_face(value: f64) -> bool {
    ((value + 0.5).round() - (value + 0.5)).abs() < 1e-8
}
