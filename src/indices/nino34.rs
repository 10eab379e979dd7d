//! Niño-3.4 DJF anomalies against a rolling same-month climatology.

use super::{IndexError, MonthlySeries};
use crate::data_io::GriddedField;
use crate::math::stats::{backfill_edges, nanmean, rolling_centered_mean};
use crate::region::NINO34;

/// Calendar months kept, in output order
const PARTITION_MONTHS: [u32; 3] = [1, 2, 12];

/// One calendar month's entries, in time order
#[derive(Debug, Default)]
struct MonthPartition {
    labels: Vec<String>,
    values: Vec<f64>,
}

impl MonthPartition {
    /// Rolling climatology with flat edges; the partition mean when the
    /// series is too short for a single full window
    fn climatology(&self, window: usize, edge: usize) -> Vec<f64> {
        let rolled = rolling_centered_mean(&self.values, window);
        if rolled.iter().all(|v| v.is_nan()) {
            let mean = nanmean(self.values.iter().copied());
            return vec![mean; self.values.len()];
        }
        backfill_edges(&rolled, edge)
    }

    fn anomalies(&self, window: usize, edge: usize) -> Vec<f64> {
        self.values
            .iter()
            .zip(self.climatology(window, edge))
            .map(|(raw, clima)| raw - clima)
            .collect()
    }
}

/// Niño-3.4 anomalies interleaved January, February, December.
///
/// Interleaving stops at the shortest of the three partitions.
pub fn nino34(field: &GriddedField, window: usize, edge: usize) -> Result<MonthlySeries, IndexError> {
    let boxed = NINO34.subset(field)?;
    let raw = boxed.spatial_mean_series();

    let mut partitions: [MonthPartition; 3] = Default::default();
    for (t, value) in boxed.time.iter().zip(raw) {
        let month = t.month()?;
        if let Some(slot) = PARTITION_MONTHS.iter().position(|&m| m == month) {
            partitions[slot].labels.push(t.label());
            partitions[slot].values.push(value);
        }
    }

    let anomalies: Vec<Vec<f64>> = partitions
        .iter()
        .map(|p| p.anomalies(window, edge))
        .collect();
    let years = partitions.iter().map(|p| p.values.len()).min().unwrap_or(0);
    log::debug!(
        "Nino-3.4 partitions: {} Jan, {} Feb, {} Dec",
        partitions[0].values.len(),
        partitions[1].values.len(),
        partitions[2].values.len()
    );

    let mut labels = Vec::with_capacity(3 * years);
    let mut values = Vec::with_capacity(3 * years);
    for i in 0..years {
        for (partition, anomaly) in partitions.iter().zip(&anomalies) {
            labels.push(partition.labels[i].clone());
            values.push(anomaly[i]);
        }
    }

    Ok(MonthlySeries {
        name: "Nino-3.4".to_string(),
        labels,
        values,
    })
}
