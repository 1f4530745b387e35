//! Von Mises angular perturbation.

use std::f64::consts::PI;

use rand::distributions::Distribution;
use rand::Rng;

use crate::error::{SimError, SimResult};

/// Von Mises distribution on `(-π, π]` centred on `mu`.
///
/// Samples with the Best–Fisher rejection scheme. An infinite concentration
/// collapses onto `mu`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VonMises {
    mu: f64,
    kappa: f64,
    r: f64,
}

impl VonMises {
    pub fn new(mu: f64, kappa: f64) -> SimResult<Self> {
        if kappa.is_nan() || kappa <= 0.0 {
            return Err(SimError::invalid(
                "kappa",
                kappa,
                "concentration must be strictly positive",
            ));
        }
        let r = if kappa.is_infinite() {
            1.0
        } else {
            let tau = 1.0 + (1.0 + 4.0 * kappa * kappa).sqrt();
            let rho = (tau - (2.0 * tau).sqrt()) / (2.0 * kappa);
            (1.0 + rho * rho) / (2.0 * rho)
        };
        Ok(Self { mu, kappa, r })
    }

    pub fn kappa(&self) -> f64 {
        self.kappa
    }
}

impl Distribution<f64> for VonMises {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.kappa.is_infinite() {
            return self.mu;
        }
        loop {
            let u: f64 = rng.gen();
            let v: f64 = rng.gen();
            let z = (PI * u).cos();
            let w = (1.0 + self.r * z) / (self.r + z);
            let c = self.kappa * (self.r - w);
            if c * (2.0 - c) > v || (c / v).ln() + 1.0 >= c {
                let theta = w.clamp(-1.0, 1.0).acos();
                let sign = if rng.gen::<f64>() < 0.5 { -1.0 } else { 1.0 };
                return wrap_angle(self.mu + sign * theta);
            }
        }
    }
}

/// Fold an angle into `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}
