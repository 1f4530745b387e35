//! Swimming speed as a function of larval age.

use std::io::{BufRead, BufReader, Read};

use tracing::warn;

use crate::error::{SimError, SimResult};
use crate::units::{cm_to_m, seconds_to_days, ONE_DAY};

/// Hatch-to-settle swimming speed curve, configured in cm/s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwimSpeed {
    hatch: f64,
    settle: f64,
}

impl SwimSpeed {
    /// Speeds in cm/s. A hatch speed above the settle speed is swapped with a warning.
    pub fn new(hatch: f64, settle: f64) -> Self {
        if hatch > settle {
            warn!(hatch, settle, "hatch and settle swimming speeds have been swapped");
            Self {
                hatch: settle,
                settle: hatch,
            }
        } else {
            Self { hatch, settle }
        }
    }

    pub fn hatch(&self) -> f64 {
        self.hatch
    }

    pub fn settle(&self) -> f64 {
        self.settle
    }

    /// Speed in m/s at `age` seconds for a potential larval duration of `pld_days`.
    ///
    /// `hatch + 10^((log10(a) / log10(pld)) · log10(settle - hatch))` with `a` the
    /// age in days plus machine epsilon. Equal speeds give a constant curve.
    pub fn speed_at_age(&self, age: f64, pld_days: f64) -> f64 {
        if self.settle == self.hatch {
            return cm_to_m(self.hatch);
        }
        let normalized_age = seconds_to_days(age) + f64::EPSILON;
        let exponent =
            (normalized_age.log10() / pld_days.log10()) * (self.settle - self.hatch).log10();
        cm_to_m(self.hatch + 10f64.powf(exponent))
    }
}

/// Step-wise speed table read from `age_days;speed_cm_s` rows.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedTable {
    /// Row start ages in seconds.
    ages: Vec<f64>,
    /// Speeds in m/s.
    speeds: Vec<f64>,
}

impl SpeedTable {
    pub fn new(rows: Vec<(f64, f64)>) -> SimResult<Self> {
        if rows.is_empty() {
            return Err(SimError::invalid(
                "swimming.speed.csv.file",
                "<empty>",
                "speed table has no rows",
            ));
        }
        let (ages, speeds) = rows
            .into_iter()
            .map(|(days, speed)| (days * ONE_DAY as f64, cm_to_m(speed)))
            .unzip();
        Ok(Self { ages, speeds })
    }

    /// Parse a `;`-separated table. The first line is a header.
    pub fn from_reader<R: Read>(reader: R) -> SimResult<Self> {
        let mut rows = Vec::new();
        for (number, line) in BufReader::new(reader).lines().enumerate().skip(1) {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parse = |field: Option<&str>| {
                field
                    .map(str::trim)
                    .and_then(|value| value.parse::<f64>().ok())
                    .ok_or_else(|| {
                        SimError::invalid(
                            "swimming.speed.csv.file",
                            line,
                            format!("line {} is not `age;speed`", number + 1),
                        )
                    })
            };
            let mut fields = line.split(';');
            let age = parse(fields.next())?;
            let speed = parse(fields.next())?;
            rows.push((age, speed));
        }
        Self::new(rows)
    }

    /// Speed in m/s of the row whose age bracket contains `age`; the last row beyond.
    pub fn speed_at_age(&self, age: f64) -> f64 {
        self.ages
            .windows(2)
            .position(|bracket| age >= bracket[0] && age < bracket[1])
            .map(|row| self.speeds[row])
            .unwrap_or(self.speeds[self.speeds.len() - 1])
    }
}

/// Either of the two swimming speed models.
#[derive(Clone, Debug, PartialEq)]
pub enum SwimModel {
    Ontogenetic(SwimSpeed),
    Table(SpeedTable),
}

impl SwimModel {
    /// Speed in m/s.
    pub fn speed_at_age(&self, age: f64, pld_days: f64) -> f64 {
        match self {
            SwimModel::Ontogenetic(curve) => curve.speed_at_age(age, pld_days),
            SwimModel::Table(table) => table.speed_at_age(age),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn newborn_swims_at_hatch_speed() {
        let curve = SwimSpeed::new(2.0, 12.0);
        assert_eq!(curve.speed_at_age(0.0, 2.0), 0.02);
    }

    #[test]
    fn settler_swims_at_settle_speed() {
        let curve = SwimSpeed::new(2.0, 12.0);
        assert_eq!(curve.speed_at_age(30.0 * 86_400.0, 30.0), 0.12);
    }

    #[test]
    fn equal_speeds_give_constant_curve() {
        let curve = SwimSpeed::new(5.0, 5.0);
        assert_eq!(curve.speed_at_age(0.0, 10.0), 0.05);
        assert_eq!(curve.speed_at_age(7.0 * 86_400.0, 10.0), 0.05);
    }

    #[test]
    fn table_is_stepwise() {
        let csv = "age;speed\n0;1\n2;3\n5;10\n";
        let table = SpeedTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.speed_at_age(0.0), 0.01);
        assert_eq!(table.speed_at_age(86_400.0 * 1.5), 0.01);
        assert_eq!(table.speed_at_age(86_400.0 * 2.0), 0.03);
        assert_eq!(table.speed_at_age(86_400.0 * 40.0), 0.1);
    }

    #[test]
    fn malformed_table_rows_fail() {
        let csv = "age;speed\n0;fast\n";
        assert!(matches!(
            SpeedTable::from_reader(csv.as_bytes()),
            Err(SimError::InvalidParameter { .. })
        ));
        assert!(SpeedTable::from_reader("age;speed\n".as_bytes()).is_err());
    }

    proptest! {
        #[test]
        fn construction_orders_hatch_below_settle(a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let curve = SwimSpeed::new(a, b);
            prop_assert!(curve.hatch() <= curve.settle());
            prop_assert_eq!(curve.hatch(), a.min(b));
            prop_assert_eq!(curve.settle(), a.max(b));
        }

        #[test]
        fn curve_spans_hatch_to_settle(
            hatch in 0.0f64..5.0,
            gap in 10.0f64..40.0,
            pld in 1.5f64..3.0,
        ) {
            let curve = SwimSpeed::new(hatch, hatch + gap);
            let start = curve.speed_at_age(0.0, pld);
            let end = curve.speed_at_age(pld * 86_400.0, pld);
            prop_assert!((start - hatch / 100.0).abs() < 1e-12);
            prop_assert!((end - (hatch + gap) / 100.0).abs() < 1e-9);
        }
    }
}
