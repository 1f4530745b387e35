use std::collections::BTreeMap;

use crate::dataset::Dataset;

/// Why a particle stopped drifting. Codes are written to the output as-is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mortality {
    #[default]
    Alive,
    DeadCold,
    OutOfDomain,
    Old,
    Beached,
    DeadHot,
}

impl Mortality {
    pub fn code(self) -> i32 {
        match self {
            Mortality::Alive => 0,
            Mortality::DeadCold => 1,
            Mortality::OutOfDomain => 2,
            Mortality::Old => 3,
            Mortality::Beached => 4,
            Mortality::DeadHot => 6,
        }
    }
}

/// One drifting larva.
///
/// Geographic (`lon`, `lat`, `depth`) and grid (`x`, `y`, `z`) coordinates are
/// kept side by side. Actions accumulate displacement in grid units through
/// [`Particle::increment`]; the system move action applies it once per step
/// and refreshes the geographic coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub index: usize,
    pub lon: f64,
    pub lat: f64,
    pub depth: Option<f64>,
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub previous_lon: f64,
    pub previous_lat: f64,
    /// Seconds since release.
    pub age: f64,
    pub locked: bool,
    mortality: Mortality,
    pending: [f64; 3],
    attributes: BTreeMap<String, f64>,
}

impl Particle {
    /// Place a particle at a geographic position. `None` when the position is
    /// not in water or lies on the domain edge.
    pub fn from_geo(
        index: usize,
        dataset: &dyn Dataset,
        lon: f64,
        lat: f64,
        depth: Option<f64>,
    ) -> Option<Self> {
        let (x, y) = dataset.latlon_to_xy(lat, lon);
        if !dataset.is_in_water(x, y) || dataset.is_on_edge(x, y) {
            return None;
        }
        let (depth, z) = match depth {
            Some(depth) if dataset.is_3d() => (Some(depth), Some(dataset.depth_to_z(x, y, depth))),
            _ => (None, None),
        };
        Some(Self::at(index, lon, lat, depth, x, y, z))
    }

    /// Place a particle at a grid position, deriving its geographic coordinates.
    pub fn from_grid(index: usize, dataset: &dyn Dataset, x: f64, y: f64, depth: Option<f64>) -> Option<Self> {
        if !dataset.is_in_water(x, y) || dataset.is_on_edge(x, y) {
            return None;
        }
        let (lat, lon) = dataset.xy_to_latlon(x, y);
        let (depth, z) = match depth {
            Some(depth) if dataset.is_3d() => (Some(depth), Some(dataset.depth_to_z(x, y, depth))),
            _ => (None, None),
        };
        Some(Self::at(index, lon, lat, depth, x, y, z))
    }

    fn at(index: usize, lon: f64, lat: f64, depth: Option<f64>, x: f64, y: f64, z: Option<f64>) -> Self {
        Self {
            index,
            lon,
            lat,
            depth,
            x,
            y,
            z,
            previous_lon: lon,
            previous_lat: lat,
            age: 0.0,
            locked: false,
            mortality: Mortality::Alive,
            pending: [0.0; 3],
            attributes: BTreeMap::new(),
        }
    }

    pub fn is_living(&self) -> bool {
        self.mortality == Mortality::Alive
    }

    pub fn mortality(&self) -> Mortality {
        self.mortality
    }

    /// Record the first cause of death and lock the particle. Later causes are ignored.
    pub fn kill(&mut self, cause: Mortality) {
        if self.mortality == Mortality::Alive && cause != Mortality::Alive {
            self.mortality = cause;
            self.locked = true;
        }
    }

    /// Queue a grid displacement to be applied by the move action.
    pub fn increment(&mut self, dx: f64, dy: f64) {
        self.pending[0] += dx;
        self.pending[1] += dy;
    }

    pub fn increment_z(&mut self, dz: f64) {
        self.pending[2] += dz;
    }

    pub fn pending_move(&self) -> [f64; 3] {
        self.pending
    }

    /// Hand over the queued displacement, leaving none behind.
    pub fn take_pending_move(&mut self) -> [f64; 3] {
        std::mem::take(&mut self.pending)
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: f64) {
        self.attributes.insert(name.into(), value);
    }

    pub fn attributes(&self) -> &BTreeMap<String, f64> {
        &self.attributes
    }
}
