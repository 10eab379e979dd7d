//! Seasonal summaries of monthly index series.

use std::collections::BTreeMap;
use std::fmt;

use crate::math::stats::nanmean;

/// One December-January-February season
#[derive(Debug, Clone, PartialEq)]
pub struct DjfSeason {
    /// Year of the December
    pub start_year: i32,
    /// Year of the January and February
    pub end_year: i32,
    pub mean: f64,
}

impl DjfSeason {
    pub fn label(&self) -> String {
        format!("{}-{}", self.start_year, self.end_year)
    }
}

/// Year and month of a `YYYY-MM...` label
fn year_month(label: &str) -> Option<(i32, u32)> {
    let year = label.get(0..4)?.parse().ok()?;
    let month = label.get(5..7)?.parse().ok()?;
    Some((year, month))
}

/// Group each December with the following January and February.
///
/// Only complete seasons are returned, in chronological order. The lone
/// December at the end of a record is dropped. Rows falling in the same
/// month (tables merged from calendars with different mid-month days) are
/// averaged, ignoring NaN.
pub fn djf_seasons(labels: &[String], values: &[f64]) -> Vec<DjfSeason> {
    let mut rows: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for (label, &value) in labels.iter().zip(values) {
        match year_month(label) {
            Some(key) => rows.entry(key).or_default().push(value),
            None => log::warn!("Skipping unparseable label '{}'", label),
        }
    }
    let monthly: BTreeMap<(i32, u32), f64> = rows
        .into_iter()
        .map(|(key, values)| (key, nanmean(values)))
        .collect();

    monthly
        .keys()
        .filter(|(_, month)| *month == 12)
        .filter_map(|&(year, _)| {
            let dec = monthly.get(&(year, 12))?;
            let jan = monthly.get(&(year + 1, 1))?;
            let feb = monthly.get(&(year + 1, 2))?;
            Some(DjfSeason {
                start_year: year,
                end_year: year + 1,
                mean: nanmean([*dec, *jan, *feb]),
            })
        })
        .collect()
}

/// Mean-state ENSO regime of a model, judged by its mean ELI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsoRegime {
    ElNinoLike,
    Neutral,
    LaNinaLike,
}

impl EnsoRegime {
    /// Above 165°E El Niño-like, below 160°E La Niña-like, neutral between
    /// (boundaries included). A NaN mean is neutral.
    pub fn classify(mean_eli: f64) -> EnsoRegime {
        if mean_eli > 165.0 {
            EnsoRegime::ElNinoLike
        } else if mean_eli < 160.0 {
            EnsoRegime::LaNinaLike
        } else {
            EnsoRegime::Neutral
        }
    }
}

impl fmt::Display for EnsoRegime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EnsoRegime::ElNinoLike => "El Niño-like",
            EnsoRegime::Neutral => "neutral",
            EnsoRegime::LaNinaLike => "La Niña-like",
        };
        f.write_str(name)
    }
}
