use tracing::info;

use crate::actions::{Action, SetupContext, StepContext};
use crate::dataset::GridPoint;
use crate::error::{SimError, SimResult};
use crate::particle::{Mortality, Particle};

/// Kills particles whose ambient temperature leaves the tolerated range.
pub struct LethalTemperature {
    key: String,
    field: String,
    cold: f64,
    hot: f64,
}

impl LethalTemperature {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            field: "temperature".to_string(),
            cold: f64::NEG_INFINITY,
            hot: f64::INFINITY,
        }
    }
}

impl Action for LethalTemperature {
    fn load_parameters(&mut self, ctx: &mut SetupContext<'_>) -> SimResult<()> {
        let params = ctx.config.block(&self.key);
        self.field = params.get_string_or("temperature_field", "temperature")?;
        self.cold = params.get_f64("cold_lethal_temperature")?;
        self.hot = params.get_f64("hot_lethal_temperature")?;
        if self.cold >= self.hot {
            return Err(SimError::action(
                &self.key,
                format!("cold threshold {} is not below hot threshold {}", self.cold, self.hot),
            ));
        }
        if params.get_bool_or("temp_tracker", true)? {
            ctx.request_tracker(self.field.clone());
        }
        info!(block = %self.key, cold = self.cold, hot = self.hot, "lethal temperature ready");
        Ok(())
    }

    fn execute(&mut self, particle: &mut Particle, ctx: &StepContext<'_>) -> SimResult<()> {
        let pos = GridPoint::new(particle.x, particle.y, particle.z);
        let temperature = ctx.dataset.sample(&self.field, &pos, ctx.time)?;
        particle.set_attribute(self.field.as_str(), temperature);
        if temperature < self.cold {
            particle.kill(Mortality::DeadCold);
        } else if temperature > self.hot {
            particle.kill(Mortality::DeadHot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::dataset::UniformDataset;
    use crate::zone::ZoneIndex;
    use serde_json::json;

    fn loaded(cold: f64, hot: f64, trackers: &mut Vec<String>) -> SimResult<LethalTemperature> {
        let config = Configuration::from_value(json!({
            "action.lethal": {
                "cold_lethal_temperature": cold,
                "hot_lethal_temperature": hot
            }
        }))?;
        let mut zones = ZoneIndex::new();
        let mut action = LethalTemperature::new("action.lethal");
        action.load_parameters(&mut SetupContext {
            config: &config,
            zones: &mut zones,
            trackers,
            seed: None,
        })?;
        Ok(action)
    }

    fn outcome(temperature: f64) -> (Mortality, Option<f64>) {
        let dataset = UniformDataset::builder().field("temperature", temperature).build();
        let zones = ZoneIndex::new();
        let ctx = StepContext {
            dataset: &dataset,
            zones: &zones,
            time: 0.0,
            dt: 3_600.0,
            transport_duration: 86_400.0,
            keep_drifting: false,
        };
        let mut trackers = Vec::new();
        let mut action = loaded(10.0, 28.0, &mut trackers).unwrap();
        assert_eq!(trackers, vec!["temperature"]);
        let mut particle = Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap();
        action.execute(&mut particle, &ctx).unwrap();
        (particle.mortality(), particle.attribute("temperature"))
    }

    #[test]
    fn thresholds_select_the_cause() {
        assert_eq!(outcome(5.0), (Mortality::DeadCold, Some(5.0)));
        assert_eq!(outcome(18.0), (Mortality::Alive, Some(18.0)));
        assert_eq!(outcome(31.0).0, Mortality::DeadHot);
    }

    #[test]
    fn inverted_thresholds_fail() {
        let mut trackers = Vec::new();
        assert!(loaded(30.0, 10.0, &mut trackers).is_err());
    }

    #[test]
    fn missing_field_propagates() {
        let dataset = UniformDataset::builder().build();
        let zones = ZoneIndex::new();
        let ctx = StepContext {
            dataset: &dataset,
            zones: &zones,
            time: 0.0,
            dt: 3_600.0,
            transport_duration: 86_400.0,
            keep_drifting: false,
        };
        let mut trackers = Vec::new();
        let mut action = loaded(10.0, 28.0, &mut trackers).unwrap();
        let mut particle = Particle::from_grid(0, &dataset, 4.0, 4.0, None).unwrap();
        assert!(action.execute(&mut particle, &ctx).is_err());
    }
}
