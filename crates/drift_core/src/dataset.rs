//! Ocean dataset collaborator.
//!
//! The engine owns no grid state: every coordinate transform and field sample
//! goes through the [`Dataset`] trait. [`UniformDataset`] is a regular
//! lon/lat grid with a constant current, used by the batch runner and tests.

use std::collections::BTreeMap;

use tracing::info;

use crate::config::{BlockParameters, Configuration};
use crate::error::{SimError, SimResult};
use crate::registry::Registry;
use crate::units::ONE_DEG_LATITUDE_IN_METER;

/// Grid-space position used to sample velocity fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl GridPoint {
    pub fn new(x: f64, y: f64, z: Option<f64>) -> Self {
        Self { x, y, z }
    }
}

pub trait Dataset: Send {
    fn set_up(&mut self, _config: &Configuration) -> SimResult<()> {
        Ok(())
    }

    fn init(&mut self) -> SimResult<()> {
        Ok(())
    }

    /// Refresh time-dependent fields for the instant `time`.
    fn next_step(&mut self, _time: f64) -> SimResult<()> {
        Ok(())
    }

    fn latlon_to_xy(&self, lat: f64, lon: f64) -> (f64, f64);

    fn xy_to_latlon(&self, x: f64, y: f64) -> (f64, f64);

    fn depth_to_z(&self, _x: f64, _y: f64, depth: f64) -> f64 {
        depth
    }

    fn z_to_depth(&self, _x: f64, _y: f64, z: f64) -> f64 {
        z
    }

    /// Zonal velocity in grid units per second.
    fn get_du(&self, pos: &GridPoint, time: f64) -> f64;

    /// Meridional velocity in grid units per second.
    fn get_dv(&self, pos: &GridPoint, time: f64) -> f64;

    fn get_dw(&self, _pos: &GridPoint, _time: f64) -> f64 {
        0.0
    }

    /// Zonal velocity in meters per second.
    fn get_u(&self, pos: &GridPoint, time: f64) -> f64;

    /// Meridional velocity in meters per second.
    fn get_v(&self, pos: &GridPoint, time: f64) -> f64;

    fn is_in_water(&self, x: f64, y: f64) -> bool;

    fn is_on_edge(&self, x: f64, y: f64) -> bool;

    /// Bottom depth of cell `(i, j)` in meters.
    fn bathymetry(&self, i: usize, j: usize) -> f64;

    fn is_3d(&self) -> bool;

    /// `(nx, ny)` cell counts.
    fn dimensions(&self) -> (usize, usize);

    /// Area of cell `(i, j)` in square meters.
    fn cell_area(&self, i: usize, j: usize) -> f64;

    /// Scalar field `name` at a grid position.
    fn sample(&self, name: &str, pos: &GridPoint, time: f64) -> SimResult<f64>;

    /// Domain boundary as `(lon, lat)` vertices.
    fn edge(&self) -> Vec<(f64, f64)>;

    /// Land cell centres as `(lon, lat)`.
    fn land_points(&self) -> Vec<(f64, f64)>;
}

/// Registry of dataset constructors keyed by `<block>.type`.
pub type DatasetRegistry = Registry<dyn Dataset>;

pub fn default_registry() -> DatasetRegistry {
    let mut registry = DatasetRegistry::new("dataset");
    registry.register("uniform", |params| {
        Ok(Box::new(UniformDataset::from_block(params)?) as Box<dyn Dataset>)
    });
    registry
}

/// Build the single enabled `dataset.*` block.
pub fn from_config(config: &Configuration, registry: &DatasetRegistry) -> SimResult<Box<dyn Dataset>> {
    let blocks = config.enabled_blocks("dataset")?;
    match blocks.as_slice() {
        [block] => registry.instantiate(config.block(block)),
        [] => Err(SimError::Dataset("no dataset block is enabled".to_string())),
        many => Err(SimError::Dataset(format!(
            "exactly one dataset block must be enabled, found {}",
            many.join(", ")
        ))),
    }
}

/// Regular lon/lat grid with a constant current.
///
/// Cell `(i, j)` is centred on `(lon_min + i·resolution, lat_min + j·resolution)`.
/// Bathymetry deepens linearly eastward from `shore_depth` by `depth_slope`
/// meters per cell.
#[derive(Clone, Debug)]
pub struct UniformDataset {
    lon_min: f64,
    lat_min: f64,
    resolution: f64,
    nx: usize,
    ny: usize,
    u: f64,
    v: f64,
    shore_depth: f64,
    depth_slope: f64,
    three_d: bool,
    land: Vec<(usize, usize)>,
    fields: BTreeMap<String, f64>,
}

#[derive(Clone, Debug)]
pub struct UniformDatasetBuilder {
    inner: UniformDataset,
}

impl UniformDataset {
    pub fn builder() -> UniformDatasetBuilder {
        UniformDatasetBuilder {
            inner: UniformDataset {
                lon_min: 0.0,
                lat_min: 0.0,
                resolution: 1.0,
                nx: 10,
                ny: 10,
                u: 0.0,
                v: 0.0,
                shore_depth: 10.0,
                depth_slope: 10.0,
                three_d: false,
                land: Vec::new(),
                fields: BTreeMap::new(),
            },
        }
    }

    pub fn from_block(params: BlockParameters<'_>) -> SimResult<Self> {
        let mut builder = Self::builder()
            .origin(params.get_f64_or("lon_min", 0.0)?, params.get_f64_or("lat_min", 0.0)?)
            .resolution(params.get_f64_or("resolution", 1.0)?)
            .current(params.get_f64_or("u", 0.0)?, params.get_f64_or("v", 0.0)?)
            .bathymetry(
                params.get_f64_or("shore_depth", 10.0)?,
                params.get_f64_or("depth_slope", 10.0)?,
            )
            .three_d(params.get_bool_or("three_d", false)?);
        let nx = params.get_f64_or("nx", 10.0)?;
        let ny = params.get_f64_or("ny", 10.0)?;
        if nx < 3.0 || ny < 3.0 {
            return Err(SimError::invalid(
                params.full_key("nx"),
                format!("{nx}x{ny}"),
                "grid needs at least 3x3 cells",
            ));
        }
        builder = builder.size(nx as usize, ny as usize);
        if !params.is_null("land") {
            let cells = params.get_f64_list("land")?;
            if cells.len() % 2 != 0 {
                return Err(SimError::invalid(
                    params.full_key("land"),
                    format!("{cells:?}"),
                    "expected `i, j` cell index pairs",
                ));
            }
            for cell in cells.chunks_exact(2) {
                builder = builder.land_cell(cell[0] as usize, cell[1] as usize);
            }
        }
        for field in ["temperature", "salinity"] {
            if !params.is_null(field) {
                builder = builder.field(field, params.get_f64(field)?);
            }
        }
        let dataset = builder.build();
        if dataset.resolution <= 0.0 {
            return Err(SimError::invalid(
                params.full_key("resolution"),
                dataset.resolution,
                "resolution must be positive",
            ));
        }
        Ok(dataset)
    }

    fn cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (i, j) = (x.round(), y.round());
        if i < 0.0 || j < 0.0 || i >= self.nx as f64 || j >= self.ny as f64 {
            return None;
        }
        Some((i as usize, j as usize))
    }

    fn meters_per_cell_x(&self, y: f64) -> f64 {
        let (lat, _) = self.xy_to_latlon(0.0, y);
        self.resolution * ONE_DEG_LATITUDE_IN_METER * lat.to_radians().cos()
    }

    fn meters_per_cell_y(&self) -> f64 {
        self.resolution * ONE_DEG_LATITUDE_IN_METER
    }
}

impl UniformDatasetBuilder {
    pub fn origin(mut self, lon_min: f64, lat_min: f64) -> Self {
        self.inner.lon_min = lon_min;
        self.inner.lat_min = lat_min;
        self
    }

    pub fn resolution(mut self, resolution: f64) -> Self {
        self.inner.resolution = resolution;
        self
    }

    pub fn size(mut self, nx: usize, ny: usize) -> Self {
        self.inner.nx = nx;
        self.inner.ny = ny;
        self
    }

    /// Constant current in m/s.
    pub fn current(mut self, u: f64, v: f64) -> Self {
        self.inner.u = u;
        self.inner.v = v;
        self
    }

    pub fn bathymetry(mut self, shore_depth: f64, depth_slope: f64) -> Self {
        self.inner.shore_depth = shore_depth;
        self.inner.depth_slope = depth_slope;
        self
    }

    pub fn three_d(mut self, three_d: bool) -> Self {
        self.inner.three_d = three_d;
        self
    }

    pub fn land_cell(mut self, i: usize, j: usize) -> Self {
        self.inner.land.push((i, j));
        self
    }

    pub fn field(mut self, name: &str, value: f64) -> Self {
        self.inner.fields.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> UniformDataset {
        self.inner
    }
}

impl Dataset for UniformDataset {
    fn init(&mut self) -> SimResult<()> {
        info!(
            nx = self.nx,
            ny = self.ny,
            resolution = self.resolution,
            "dataset initialization [OK]"
        );
        Ok(())
    }

    fn latlon_to_xy(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            (lon - self.lon_min) / self.resolution,
            (lat - self.lat_min) / self.resolution,
        )
    }

    fn xy_to_latlon(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.lat_min + y * self.resolution,
            self.lon_min + x * self.resolution,
        )
    }

    fn get_du(&self, pos: &GridPoint, _time: f64) -> f64 {
        self.u / self.meters_per_cell_x(pos.y)
    }

    fn get_dv(&self, _pos: &GridPoint, _time: f64) -> f64 {
        self.v / self.meters_per_cell_y()
    }

    fn get_u(&self, _pos: &GridPoint, _time: f64) -> f64 {
        self.u
    }

    fn get_v(&self, _pos: &GridPoint, _time: f64) -> f64 {
        self.v
    }

    fn is_in_water(&self, x: f64, y: f64) -> bool {
        match self.cell(x, y) {
            Some(cell) => !self.land.contains(&cell),
            None => false,
        }
    }

    fn is_on_edge(&self, x: f64, y: f64) -> bool {
        x < 1.0 || y < 1.0 || x > self.nx as f64 - 2.0 || y > self.ny as f64 - 2.0
    }

    fn bathymetry(&self, i: usize, _j: usize) -> f64 {
        self.shore_depth + self.depth_slope * i as f64
    }

    fn is_3d(&self) -> bool {
        self.three_d
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    fn cell_area(&self, _i: usize, j: usize) -> f64 {
        self.meters_per_cell_x(j as f64) * self.meters_per_cell_y()
    }

    fn sample(&self, name: &str, _pos: &GridPoint, _time: f64) -> SimResult<f64> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| SimError::Dataset(format!("field {name:?} is not available")))
    }

    fn edge(&self) -> Vec<(f64, f64)> {
        let (x_max, y_max) = ((self.nx - 1) as f64, (self.ny - 1) as f64);
        [(0.0, 0.0), (x_max, 0.0), (x_max, y_max), (0.0, y_max)]
            .into_iter()
            .map(|(x, y)| {
                let (lat, lon) = self.xy_to_latlon(x, y);
                (lon, lat)
            })
            .collect()
    }

    fn land_points(&self) -> Vec<(f64, f64)> {
        self.land
            .iter()
            .map(|&(i, j)| {
                let (lat, lon) = self.xy_to_latlon(i as f64, j as f64);
                (lon, lat)
            })
            .collect()
    }
}
