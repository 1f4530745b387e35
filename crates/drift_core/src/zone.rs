//! Named polygons with optional depth and bathymetry masks.

use tracing::{debug, info};

use crate::config::Configuration;
use crate::dataset::Dataset;
use crate::error::{SimError, SimResult};
use crate::particle::Particle;

/// Depth band in meters, both bounds positive downward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthMask {
    pub upper: f64,
    pub lower: f64,
}

/// Band between two isobaths in meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BathymetryMask {
    pub inshore: f64,
    pub offshore: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    /// Configuration key, e.g. `release.zone2`.
    pub key: String,
    pub name: String,
    pub prefix: String,
    pub index: f64,
    lon: Vec<f64>,
    lat: Vec<f64>,
    depth: Option<DepthMask>,
    bathymetry: Option<BathymetryMask>,
    /// User-defined share of a release, if any.
    pub proportion: Option<f64>,
    bbox: Option<GridBox>,
}

impl Zone {
    pub fn new(key: &str, name: &str, prefix: &str, lon: Vec<f64>, lat: Vec<f64>) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            prefix: prefix.to_string(),
            index: 0.0,
            lon,
            lat,
            depth: None,
            bathymetry: None,
            proportion: None,
            bbox: None,
        }
    }

    pub fn with_depth_mask(mut self, upper: f64, lower: f64) -> Self {
        self.depth = Some(DepthMask { upper, lower });
        self
    }

    pub fn with_bathymetry_mask(mut self, inshore: f64, offshore: f64) -> Self {
        self.bathymetry = Some(BathymetryMask { inshore, offshore });
        self
    }

    pub fn depth_mask(&self) -> Option<DepthMask> {
        self.depth
    }

    /// Vertices as `(lon, lat)`; closed after initialization.
    pub fn polygon(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.lon.iter().copied().zip(self.lat.iter().copied())
    }

    pub fn bbox(&self) -> Option<GridBox> {
        self.bbox
    }

    /// Validate the masks, close the polygon and compute the grid bounding box.
    pub fn initialize(&mut self, dataset: &dyn Dataset) -> SimResult<()> {
        if self.lon.len() != self.lat.len() {
            return Err(SimError::zone(
                &self.key,
                "longitude and latitude lists differ in length",
            ));
        }
        if self.lon.len() < 3 {
            return Err(SimError::zone(&self.key, "polygon needs at least 3 vertices"));
        }
        if let Some(mask) = self.depth {
            if mask.lower < mask.upper {
                return Err(SimError::zone(
                    &self.key,
                    format!("lower depth {} above upper depth {}", mask.lower, mask.upper),
                ));
            }
        }
        if let Some(mask) = self.bathymetry {
            if mask.offshore < mask.inshore {
                return Err(SimError::zone(
                    &self.key,
                    format!(
                        "offshore line {} shallower than inshore line {}",
                        mask.offshore, mask.inshore
                    ),
                ));
            }
        }
        let closed = self.lon.first() == self.lon.last() && self.lat.first() == self.lat.last();
        if !closed {
            self.lon.push(self.lon[0]);
            self.lat.push(self.lat[0]);
        }
        let mut bbox = GridBox {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        };
        for (lon, lat) in self.polygon() {
            let (x, y) = dataset.latlon_to_xy(lat, lon);
            bbox.x_min = bbox.x_min.min(x);
            bbox.x_max = bbox.x_max.max(x);
            bbox.y_min = bbox.y_min.min(y);
            bbox.y_max = bbox.y_max.max(y);
        }
        self.bbox = Some(bbox);
        Ok(())
    }

    /// Depth mask, then bathymetry mask, then polygon; all must hold.
    pub fn is_inside(&self, particle: &Particle, dataset: &dyn Dataset) -> bool {
        if let (Some(mask), Some(depth)) = (self.depth, particle.depth) {
            if !is_depth_in_layer(mask, depth.abs()) {
                return false;
            }
        }
        if !self.is_between_isobaths(particle.x, particle.y, dataset) {
            return false;
        }
        self.contains_lonlat(particle.lon, particle.lat)
    }

    /// Membership of a grid position: in water, between isobaths, inside the polygon.
    pub fn contains_grid_point(&self, x: f64, y: f64, dataset: &dyn Dataset) -> bool {
        if !dataset.is_in_water(x, y) || !self.is_between_isobaths(x, y, dataset) {
            return false;
        }
        let (lat, lon) = dataset.xy_to_latlon(x, y);
        self.contains_lonlat(lon, lat)
    }

    fn is_between_isobaths(&self, x: f64, y: f64, dataset: &dyn Dataset) -> bool {
        match self.bathymetry {
            Some(mask) => {
                let depth = dataset.bathymetry(round_index(x), round_index(y));
                depth > mask.inshore && depth < mask.offshore
            }
            None => true,
        }
    }

    /// Ray-casting test over the closed polygon.
    ///
    /// A point on a vertex is decided by the crossing count like any other
    /// point: for the unit square `(0,0),(0,1),(1,1),(1,0)` the vertex `(0,0)`
    /// is inside and `(1,1)` is outside.
    pub fn contains_lonlat(&self, lon: f64, lat: f64) -> bool {
        let (x, y) = (lon, lat);
        let vertices: Vec<(f64, f64)> = self.closed_polygon().collect();
        let mut crossings: i32 = 0;
        for edge in vertices.windows(2) {
            let ((xk, yk), (xn, yn)) = (edge[0], edge[1]);
            if xk == xn {
                continue;
            }
            let dx1 = x - xk;
            let dx2 = xn - x;
            let dxy = dx2 * (y - yk) - dx1 * (yn - y);
            let mut inc = 0;
            if xk == x && yk == y {
                crossings = 1;
            } else if (dx1 == 0.0 && y >= yk) || (dx2 == 0.0 && y >= yn) {
                inc = 1;
            } else if dx1 * dx2 > 0.0 && (xn - xk) * dxy >= 0.0 {
                inc = 2;
            }
            if xn > xk {
                crossings += inc;
            } else {
                crossings -= inc;
            }
        }
        crossings != 0
    }

    fn closed_polygon(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let closed = self.lon.first() == self.lon.last() && self.lat.first() == self.lat.last();
        let closing = if closed || self.lon.is_empty() {
            None
        } else {
            Some((self.lon[0], self.lat[0]))
        };
        self.polygon().chain(closing)
    }

    /// In-water area covered by the zone, in square kilometers.
    pub fn area_km2(&self, dataset: &dyn Dataset) -> f64 {
        let (nx, ny) = dataset.dimensions();
        let Some(bbox) = self.bbox else {
            return 0.0;
        };
        let i_min = bbox.x_min.floor().max(0.0) as usize;
        let j_min = bbox.y_min.floor().max(0.0) as usize;
        let i_max = (bbox.x_max.ceil().max(0.0) as usize).min(nx.saturating_sub(1));
        let j_max = (bbox.y_max.ceil().max(0.0) as usize).min(ny.saturating_sub(1));
        let mut area = 0.0;
        for i in i_min..=i_max {
            for j in j_min..=j_max {
                if self.contains_grid_point(i as f64, j as f64, dataset) {
                    area += dataset.cell_area(i, j) * 1e-6;
                }
            }
        }
        area
    }
}

fn is_depth_in_layer(mask: DepthMask, depth: f64) -> bool {
    depth <= mask.lower && depth >= mask.upper
}

fn round_index(value: f64) -> usize {
    value.round().max(0.0) as usize
}

/// Zone table shared by release processes and actions.
///
/// Zones are kept in load order; every query that returns several zones
/// preserves that order.
#[derive(Clone, Debug, Default)]
pub struct ZoneIndex {
    zones: Vec<Zone>,
}

impl ZoneIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.zones.clear();
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Load every enabled `<prefix>.zone<N>` block. Loading a prefix twice is a no-op.
    pub fn load_zones(&mut self, config: &Configuration, prefix: &str) -> SimResult<()> {
        if self.zones.iter().any(|zone| zone.prefix == prefix) {
            return Ok(());
        }
        let head = format!("{prefix}.zone");
        let mut keys: Vec<(u64, String)> = config
            .find_keys(&head, ".name")
            .into_iter()
            .filter_map(|name_key| {
                let key = name_key.strip_suffix(".name")?.to_string();
                let number = key[head.len()..].parse::<u64>().ok()?;
                Some((number, key))
            })
            .collect();
        keys.sort();

        let mut zones = Vec::with_capacity(keys.len());
        for (_, key) in keys {
            if !config.get_bool_or(&format!("{key}.enabled"), true)? {
                continue;
            }
            let zone = zone_from_config(config, &key, prefix)?;
            if zones.iter().any(|other: &Zone| other.name == zone.name) {
                return Err(SimError::zone(
                    &key,
                    format!("duplicate zone name {:?} under prefix {prefix}", zone.name),
                ));
            }
            zones.push(zone);
        }
        self.insert_group(zones);
        info!(prefix, zones = self.zones(prefix).count(), "zones loaded");
        Ok(())
    }

    /// Append zones sharing one prefix, assigning their fractional indices.
    pub fn insert_group(&mut self, mut zones: Vec<Zone>) {
        if zones.is_empty() {
            return;
        }
        let base = self
            .zones
            .iter()
            .map(|zone| zone.index)
            .fold(None, |max: Option<f64>, index| {
                Some(max.map_or(index, |max| max.max(index)))
            })
            .map_or(0.0, |max| max.floor() + 1.0);
        let digits = zones.len().to_string().len() as i32;
        let increment = 10f64.powi(-digits);
        let scale = 10f64.powi(digits);
        for (k, zone) in zones.iter_mut().enumerate() {
            zone.index = ((base + k as f64 * increment) * scale).round() / scale;
            debug!(zone = %zone.key, index = zone.index, "zone indexed");
        }
        self.zones.append(&mut zones);
    }

    /// Validate every zone and precompute bounding boxes.
    pub fn initialize(&mut self, dataset: &dyn Dataset) -> SimResult<()> {
        for zone in &mut self.zones {
            zone.initialize(dataset)?;
        }
        info!(zones = self.zones.len(), "zone initialization [OK]");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.key == key)
    }

    pub fn zones<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Zone> + 'a {
        self.zones.iter().filter(move |zone| zone.prefix == prefix)
    }

    pub fn all(&self) -> &[Zone] {
        &self.zones
    }

    /// Distinct prefixes, sorted.
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.zones.iter().map(|zone| zone.prefix.clone()).collect();
        prefixes.sort();
        prefixes.dedup();
        prefixes
    }

    pub fn is_inside(&self, particle: &Particle, key: &str, dataset: &dyn Dataset) -> SimResult<bool> {
        let zone = self
            .get(key)
            .ok_or_else(|| SimError::zone(key, "no such zone"))?;
        Ok(zone.is_inside(particle, dataset))
    }

    /// Indices of the zones containing `particle`, in load order.
    pub fn find_zones(&self, particle: &Particle, dataset: &dyn Dataset, prefix: Option<&str>) -> Vec<f64> {
        self.zones
            .iter()
            .filter(|zone| prefix.map_or(true, |prefix| zone.prefix == prefix))
            .filter(|zone| zone.is_inside(particle, dataset))
            .map(|zone| zone.index)
            .collect()
    }
}

fn zone_from_config(config: &Configuration, key: &str, prefix: &str) -> SimResult<Zone> {
    let name = config.get_string(&format!("{key}.name"))?;
    let lon = config.get_f64_list(&format!("{key}.longitude"))?;
    let lat = config.get_f64_list(&format!("{key}.latitude"))?;
    if lon.len() != lat.len() {
        return Err(SimError::zone(
            key,
            "longitude and latitude lists differ in length",
        ));
    }
    let mut zone = Zone::new(key, &name, prefix, lon, lat);
    if config.get_bool_or(&format!("{key}.depth.enabled"), false)? {
        zone = zone.with_depth_mask(
            config.get_f64(&format!("{key}.depth.upper"))?,
            config.get_f64(&format!("{key}.depth.lower"))?,
        );
    }
    if config.get_bool_or(&format!("{key}.bathymetry.enabled"), false)? {
        zone = zone.with_bathymetry_mask(
            config.get_f64(&format!("{key}.bathymetry.inshore"))?,
            config.get_f64(&format!("{key}.bathymetry.offshore"))?,
        );
    }
    let proportion_key = format!("{key}.proportion");
    if !config.is_null(&proportion_key) {
        zone.proportion = Some(config.get_f64(&proportion_key)?);
    }
    Ok(zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::UniformDataset;
    use serde_json::json;

    fn unit_square() -> Zone {
        Zone::new(
            "test.zone0",
            "square",
            "test",
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 1.0, 1.0, 0.0],
        )
    }

    #[test]
    fn unit_square_membership() {
        let zone = unit_square();
        assert!(zone.contains_lonlat(0.5, 0.5));
        assert!(!zone.contains_lonlat(2.0, 2.0));
        // Vertex classification follows the crossing count.
        assert!(zone.contains_lonlat(0.0, 0.0));
        assert!(!zone.contains_lonlat(1.0, 1.0));
    }

    #[test]
    fn closing_the_polygon_keeps_membership() {
        let dataset = UniformDataset::builder().build();
        let mut zone = unit_square();
        let before: Vec<bool> = [(0.5, 0.5), (2.0, 2.0), (0.0, 0.0), (1.0, 1.0)]
            .iter()
            .map(|&(lon, lat)| zone.contains_lonlat(lon, lat))
            .collect();
        zone.initialize(&dataset).unwrap();
        assert_eq!(zone.polygon().count(), 5);
        let after: Vec<bool> = [(0.5, 0.5), (2.0, 2.0), (0.0, 0.0), (1.0, 1.0)]
            .iter()
            .map(|&(lon, lat)| zone.contains_lonlat(lon, lat))
            .collect();
        assert_eq!(before, after);
    }

    fn particle_at(dataset: &UniformDataset, lon: f64, lat: f64, depth: Option<f64>) -> Particle {
        Particle::from_geo(0, dataset, lon, lat, depth).unwrap()
    }

    #[test]
    fn depth_mask_uses_absolute_depth() {
        let dataset = UniformDataset::builder().three_d(true).build();
        let zone = Zone::new(
            "z.zone0",
            "box",
            "z",
            vec![2.0, 2.0, 6.0, 6.0],
            vec![2.0, 6.0, 6.0, 2.0],
        )
        .with_depth_mask(10.0, 50.0);
        assert!(zone.is_inside(&particle_at(&dataset, 4.0, 4.0, Some(-20.0)), &dataset));
        assert!(zone.is_inside(&particle_at(&dataset, 4.0, 4.0, Some(-50.0)), &dataset));
        assert!(!zone.is_inside(&particle_at(&dataset, 4.0, 4.0, Some(-60.0)), &dataset));
        assert!(!zone.is_inside(&particle_at(&dataset, 4.0, 4.0, Some(-5.0)), &dataset));
    }

    #[test]
    fn bathymetry_mask_is_strict() {
        // Depth is 10 + 10·i: cell 2 lies on the inshore line, cell 5 on the offshore line.
        let dataset = UniformDataset::builder().build();
        let zone = Zone::new(
            "z.zone0",
            "box",
            "z",
            vec![1.0, 1.0, 8.0, 8.0],
            vec![1.0, 8.0, 8.0, 1.0],
        )
        .with_bathymetry_mask(30.0, 60.0);
        assert!(zone.is_inside(&particle_at(&dataset, 4.0, 4.0, None), &dataset));
        assert!(!zone.is_inside(&particle_at(&dataset, 2.0, 4.0, None), &dataset));
        assert!(!zone.is_inside(&particle_at(&dataset, 5.0, 4.0, None), &dataset));
        assert!(!zone.is_inside(&particle_at(&dataset, 6.0, 4.0, None), &dataset));
    }

    #[test]
    fn invalid_masks_fail_initialization() {
        let dataset = UniformDataset::builder().build();
        let mut zone = unit_square().with_depth_mask(50.0, 10.0);
        assert!(matches!(zone.initialize(&dataset), Err(SimError::Zone { .. })));
        let mut zone = unit_square().with_bathymetry_mask(100.0, 20.0);
        assert!(matches!(zone.initialize(&dataset), Err(SimError::Zone { .. })));
        let mut zone = Zone::new("z.zone0", "line", "z", vec![0.0, 1.0], vec![0.0, 1.0]);
        assert!(zone.initialize(&dataset).is_err());
    }

    fn zone_config() -> Configuration {
        let square = json!({"longitude": [2, 2, 6, 6], "latitude": [2, 6, 6, 2]});
        let mut config = Configuration::from_value(json!({
            "release": {
                "zone0": {"name": "a", "enabled": true},
                "zone1": {"name": "b", "enabled": false},
                "zone2": {"name": "c"},
                "zone10": {"name": "d"}
            },
            "target": {
                "zone0": {"name": "t"}
            }
        }))
        .unwrap();
        for key in ["release.zone0", "release.zone1", "release.zone2", "release.zone10", "target.zone0"] {
            config.set(format!("{key}.longitude"), square["longitude"].clone());
            config.set(format!("{key}.latitude"), square["latitude"].clone());
        }
        config
    }

    #[test]
    fn indices_are_fractional_and_grouped() {
        let config = zone_config();
        let mut index = ZoneIndex::new();
        index.load_zones(&config, "release").unwrap();
        index.load_zones(&config, "target").unwrap();
        index.load_zones(&config, "release").unwrap();
        let release: Vec<(String, f64)> = index
            .zones("release")
            .map(|zone| (zone.name.clone(), zone.index))
            .collect();
        assert_eq!(
            release,
            vec![
                ("a".to_string(), 0.0),
                ("c".to_string(), 0.1),
                ("d".to_string(), 0.2)
            ]
        );
        assert_eq!(index.zones("target").next().map(|zone| zone.index), Some(1.0));
        assert_eq!(index.prefixes(), vec!["release".to_string(), "target".to_string()]);
    }

    #[test]
    fn ten_zones_need_two_decimals() {
        let mut index = ZoneIndex::new();
        index.insert_group(vec![unit_square()]);
        let group: Vec<Zone> = (0..10)
            .map(|k| Zone::new(&format!("g.zone{k}"), &format!("g{k}"), "g", vec![], vec![]))
            .collect();
        index.insert_group(group);
        let indices: Vec<f64> = index.zones("g").map(|zone| zone.index).collect();
        assert_eq!(indices[0], 1.0);
        assert_eq!(indices[1], 1.01);
        assert_eq!(indices[9], 1.09);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config = zone_config();
        config.set("release.zone2.name", "a");
        let mut index = ZoneIndex::new();
        assert!(matches!(
            index.load_zones(&config, "release"),
            Err(SimError::Zone { .. })
        ));
    }

    #[test]
    fn find_zones_reports_every_match_in_load_order() {
        let dataset = UniformDataset::builder().build();
        let config = zone_config();
        let mut index = ZoneIndex::new();
        index.load_zones(&config, "release").unwrap();
        index.load_zones(&config, "target").unwrap();
        index.initialize(&dataset).unwrap();
        let inside = particle_at(&dataset, 4.0, 4.0, None);
        assert_eq!(index.find_zones(&inside, &dataset, None), vec![0.0, 0.1, 0.2, 1.0]);
        assert_eq!(index.find_zones(&inside, &dataset, Some("target")), vec![1.0]);
        let outside = particle_at(&dataset, 8.0, 8.0, None);
        assert!(index.find_zones(&outside, &dataset, None).is_empty());
        assert!(index.is_inside(&inside, "target.zone0", &dataset).unwrap());
        assert!(index.is_inside(&inside, "nowhere", &dataset).is_err());
    }

    #[test]
    fn area_counts_wet_cells_inside() {
        let dataset = UniformDataset::builder().land_cell(4, 4).build();
        let mut zone = Zone::new(
            "z.zone0",
            "box",
            "z",
            vec![2.5, 2.5, 5.5, 5.5],
            vec![2.5, 5.5, 5.5, 2.5],
        );
        zone.initialize(&dataset).unwrap();
        // Cells 3..=5 in each direction, minus the land cell.
        let expected: f64 = (3..=5)
            .flat_map(|i| (3..=5).map(move |j| (i, j)))
            .filter(|&cell| cell != (4, 4))
            .map(|(i, j)| dataset.cell_area(i, j) * 1e-6)
            .sum();
        assert!((zone.area_km2(&dataset) - expected).abs() < 1e-9);
    }
}
