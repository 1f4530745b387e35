//! Transport by the dataset currents.

use tracing::{info, warn};

use crate::actions::{Action, SetupContext, StepContext};
use crate::dataset::{Dataset, GridPoint};
use crate::error::{SimError, SimResult};
use crate::particle::{Mortality, Particle};

/// Displacements above one grid cell per step break the CFL condition.
const CFL_THRESHOLD: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scheme {
    Euler,
    #[default]
    RungeKutta4,
}

impl Scheme {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "euler" | "forward euler" => Some(Scheme::Euler),
            "rk4" | "runge kutta 4" => Some(Scheme::RungeKutta4),
            _ => None,
        }
    }
}

pub struct Advection {
    key: String,
    scheme: Scheme,
    horizontal: bool,
    vertical: bool,
}

impl Advection {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            scheme: Scheme::default(),
            horizontal: true,
            vertical: true,
        }
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    fn displacement(&self, dataset: &dyn Dataset, p0: GridPoint, time: f64, dt: f64) -> [f64; 3] {
        match self.scheme {
            Scheme::Euler => euler(dataset, p0, time, dt),
            Scheme::RungeKutta4 => runge_kutta4(dataset, p0, time, dt),
        }
    }
}

impl Action for Advection {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        let params = ctx.config.block(&self.key);
        if !params.is_null("scheme") {
            let name = params.get_string("scheme")?;
            self.scheme = Scheme::from_name(&name).ok_or_else(|| {
                SimError::invalid(params.full_key("scheme"), &name, "expected euler or rk4")
            })?;
        }
        self.horizontal = params.get_bool_or("horizontal", true)?;
        self.vertical = params.get_bool_or("vertical", true)?;
        info!(block = %self.key, scheme = ?self.scheme, "advection ready");
        Ok(())
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        let p0 = GridPoint::new(particle.x, particle.y, particle.z);
        let mut mv = self.displacement(ctx.dataset, p0, ctx.time, ctx.dt);
        if ctx.dt < 0.0 {
            // Backward: sample the velocity again from the first guess position.
            let guess = shifted(p0, mv, 1.0);
            if ctx.dataset.is_on_edge(guess.x, guess.y) {
                particle.kill(Mortality::OutOfDomain);
                return Ok(());
            }
            mv = self.displacement(ctx.dataset, guess, ctx.time, ctx.dt);
        }
        if !self.horizontal {
            mv[0] = 0.0;
            mv[1] = 0.0;
        }
        particle.increment(mv[0], mv[1]);
        if self.vertical && particle.z.is_some() {
            particle.increment_z(mv[2]);
        }
        Ok(())
    }
}

fn shifted(p: GridPoint, mv: [f64; 3], factor: f64) -> GridPoint {
    GridPoint::new(
        p.x + factor * mv[0],
        p.y + factor * mv[1],
        p.z.map(|z| z + factor * mv[2]),
    )
}

/// Grid displacement over `dt` at the velocity sampled at `p`.
pub fn euler(dataset: &dyn Dataset, p: GridPoint, time: f64, dt: f64) -> [f64; 3] {
    let mv = [
        dataset.get_du(&p, time) * dt,
        dataset.get_dv(&p, time) * dt,
        if p.z.is_some() {
            dataset.get_dw(&p, time) * dt
        } else {
            0.0
        },
    ];
    for (component, value) in ["u", "v", "w"].into_iter().zip(mv) {
        if value.abs() > CFL_THRESHOLD {
            warn!(component, displacement = value, "CFL broken");
        }
    }
    mv
}

/// Fourth order Runge-Kutta displacement. Stops at the last stage whose
/// intermediate position stays off the domain edge.
pub fn runge_kutta4(dataset: &dyn Dataset, p0: GridPoint, time: f64, dt: f64) -> [f64; 3] {
    let k1 = euler(dataset, p0, time, dt);
    let p = shifted(p0, k1, 0.5);
    if dataset.is_on_edge(p.x, p.y) {
        return [0.5 * k1[0], 0.5 * k1[1], 0.0];
    }
    let k2 = euler(dataset, p, time + 0.5 * dt, dt);
    let p = shifted(p0, k2, 0.5);
    if dataset.is_on_edge(p.x, p.y) {
        return [0.5 * k2[0], 0.5 * k2[1], 0.0];
    }
    let k3 = euler(dataset, p, time + 0.5 * dt, dt);
    let p = shifted(p0, k3, 1.0);
    if dataset.is_on_edge(p.x, p.y) {
        return [k3[0], k3[1], 0.0];
    }
    let k4 = euler(dataset, p, time + dt, dt);
    std::array::from_fn(|i| (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]) / 6.0)
}
