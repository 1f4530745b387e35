use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::{info, warn};

use crate::actions::SetupContext;
use crate::error::{SimError, SimResult};
use crate::particle::Particle;
use crate::release::{ReleaseContext, ReleaseProcess};

/// A drifter start position: longitude, latitude and optional depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrifterPoint {
    pub lon: f64,
    pub lat: f64,
    pub depth: Option<f64>,
}

/// Releases one particle per listed point at every event.
pub struct PointRelease {
    key: String,
    points: Vec<DrifterPoint>,
}

impl PointRelease {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            points: Vec::new(),
        }
    }

    pub fn with_points(mut self, points: Vec<DrifterPoint>) -> Self {
        self.points = points;
        self
    }

    pub fn points(&self) -> &[DrifterPoint] {
        &self.points
    }
}

/// Parse `lon lat [depth]` lines. Blank lines and `#` comments are skipped.
pub fn read_points<R: Read>(reader: R) -> SimResult<Vec<DrifterPoint>> {
    let mut points = Vec::new();
    for (number, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SimError::Release(format!("drifter line {}: {err}", number + 1)))?;
        let point = match values.as_slice() {
            [lon, lat] => DrifterPoint {
                lon: *lon,
                lat: *lat,
                depth: None,
            },
            [lon, lat, depth] => DrifterPoint {
                lon: *lon,
                lat: *lat,
                depth: Some(*depth),
            },
            _ => {
                return Err(SimError::Release(format!(
                    "drifter line {} needs `lon lat [depth]`, got {line:?}",
                    number + 1
                )))
            }
        };
        points.push(point);
    }
    Ok(points)
}

fn read_points_file(path: &Path) -> SimResult<Vec<DrifterPoint>> {
    let file = File::open(path)
        .map_err(|err| SimError::Release(format!("cannot open drifter file {}: {err}", path.display())))?;
    read_points(file)
}

impl ReleaseProcess for PointRelease {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        let params = ctx.config.block(&self.key);
        self.points = if !params.is_null("file") {
            read_points_file(Path::new(&params.get_string("file")?))?
        } else {
            let lon = params.get_f64_list("longitude")?;
            let lat = params.get_f64_list("latitude")?;
            if lon.len() != lat.len() {
                return Err(SimError::invalid(
                    params.full_key("latitude"),
                    lat.len(),
                    format!("expected {} latitudes to match the longitudes", lon.len()),
                ));
            }
            let depth = if params.is_null("depth") {
                vec![None; lon.len()]
            } else {
                let depth = params.get_f64_list("depth")?;
                if depth.len() != lon.len() {
                    return Err(SimError::invalid(
                        params.full_key("depth"),
                        depth.len(),
                        format!("expected {} depths to match the longitudes", lon.len()),
                    ));
                }
                depth.into_iter().map(Some).collect()
            };
            lon.into_iter()
                .zip(lat)
                .zip(depth)
                .map(|((lon, lat), depth)| DrifterPoint { lon, lat, depth })
                .collect()
        };
        if self.points.is_empty() {
            return Err(SimError::Release(format!("{} lists no drifter point", self.key)));
        }
        info!(block = %self.key, points = self.points.len(), "point release ready");
        Ok(())
    }

    fn release(&mut self, ctx: &ReleaseContext<'_>) -> SimResult<Vec<Particle>> {
        let mut particles = Vec::with_capacity(self.points.len());
        for point in &self.points {
            let index = ctx.first_index + particles.len();
            match Particle::from_geo(index, ctx.dataset, point.lon, point.lat, point.depth) {
                Some(particle) => particles.push(particle),
                None => warn!(lon = point.lon, lat = point.lat, "drifter point is not in water, skipped"),
            }
        }
        Ok(particles)
    }
}
