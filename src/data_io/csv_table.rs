//! CSV table of monthly index series, one column per realization.

use csv::{Reader, Writer};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::output_trait::{resolve_duplicate, staging_path, Accumulator, DuplicatePolicy, InsertOutcome, WriteError};

/// Header of the row-label column
pub const INDEX_COLUMN: &str = "time";

#[derive(Debug)]
pub struct SeriesTable {
    path: PathBuf,
    labels: Vec<String>,
    columns: Vec<(String, Vec<f64>)>,
    policy: DuplicatePolicy,
}

impl SeriesTable {
    /// Load the columns already in `path`, or start empty if it does not exist
    pub fn open_or_create(path: impl AsRef<Path>, policy: DuplicatePolicy) -> Result<Self, WriteError> {
        let path = path.as_ref().to_path_buf();
        let mut table = Self {
            path,
            labels: Vec::new(),
            columns: Vec::new(),
            policy,
        };
        if table.path.exists() {
            table.load()?;
        }
        Ok(table)
    }

    fn load(&mut self) -> Result<(), WriteError> {
        let malformed = |reason: String| WriteError::Format {
            path: self.path.display().to_string(),
            reason,
        };
        let mut reader = Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let mut columns: Vec<(String, Vec<f64>)> = headers
            .iter()
            .skip(1)
            .map(|h| (h.to_string(), Vec::new()))
            .collect();
        let mut labels = Vec::new();

        for record in reader.records() {
            let record = record?;
            labels.push(record.get(0).unwrap_or_default().to_string());
            for (i, (name, values)) in columns.iter_mut().enumerate() {
                let cell = record.get(i + 1).unwrap_or_default().trim();
                let value = if cell.is_empty() {
                    f64::NAN
                } else {
                    cell.parse::<f64>()
                        .map_err(|_| malformed(format!("column {}: invalid value '{}'", name, cell)))?
                };
                values.push(value);
            }
        }

        self.labels = labels;
        self.columns = columns;
        Ok(())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Add a series as column `name`, aligning rows on their labels.
    ///
    /// Rows are the sorted union of all labels; cells a series does not
    /// cover are NaN.
    pub fn insert_series(
        &mut self,
        name: &str,
        labels: &[String],
        values: &[f64],
    ) -> Result<InsertOutcome, WriteError> {
        if labels.len() != values.len() {
            return Err(WriteError::Format {
                path: self.path.display().to_string(),
                reason: format!(
                    "series {} has {} labels for {} values",
                    name,
                    labels.len(),
                    values.len()
                ),
            });
        }

        let position = self.columns.iter().position(|(n, _)| n == name);
        let outcome = resolve_duplicate(name, position.is_some(), self.policy)?;
        if outcome == InsertOutcome::Skipped {
            return Ok(outcome);
        }
        if let Some(i) = position {
            self.columns.remove(i);
        }

        let merged: Vec<String> = self
            .labels
            .iter()
            .chain(labels.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if merged != self.labels {
            let old_labels = std::mem::take(&mut self.labels);
            for (_, column) in self.columns.iter_mut() {
                *column = realign(&old_labels, column, &merged);
            }
            self.labels = merged;
        }

        let column = realign(labels, values, &self.labels);
        match position {
            Some(i) => self.columns.insert(i, (name.to_string(), column)),
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(outcome)
    }
}

/// Values of `labels` laid out along `target`, NaN where absent
fn realign(labels: &[String], values: &[f64], target: &[String]) -> Vec<f64> {
    target
        .iter()
        .map(|t| {
            labels
                .iter()
                .position(|l| l == t)
                .map_or(f64::NAN, |i| values[i])
        })
        .collect()
}

impl Accumulator for SeriesTable {
    fn path(&self) -> &Path {
        &self.path
    }

    fn names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    fn save(&self) -> Result<(), WriteError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = staging_path(&self.path);
        {
            let mut wtr = Writer::from_path(&staging)?;
            let mut header = vec![INDEX_COLUMN.to_string()];
            header.extend(self.columns.iter().map(|(n, _)| n.clone()));
            wtr.write_record(&header)?;

            for (row, label) in self.labels.iter().enumerate() {
                let mut record = vec![label.clone()];
                record.extend(self.columns.iter().map(|(_, values)| {
                    let value = values[row];
                    if value.is_nan() {
                        String::new()
                    } else {
                        value.to_string()
                    }
                }));
                wtr.write_record(&record)?;
            }
            wtr.flush()?;
        }
        fs::rename(&staging, &self.path)?;
        log::info!(
            "Saved {} series to {}",
            self.columns.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_open_or_create_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eli.csv");

        let mut table = SeriesTable::open_or_create(&path, DuplicatePolicy::Replace).unwrap();
        assert!(table.is_empty());
        table
            .insert_series(
                "CESM2: Realization 1, Initialization 1, Physics 1, Forcing 1",
                &labels(&["1850-01-15", "1850-02-15"]),
                &[180.5, f64::NAN],
            )
            .unwrap();
        table.save().unwrap();

        let reopened = SeriesTable::open_or_create(&path, DuplicatePolicy::Replace).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.labels(), &labels(&["1850-01-15", "1850-02-15"])[..]);
        let column = reopened
            .column("CESM2: Realization 1, Initialization 1, Physics 1, Forcing 1")
            .unwrap();
        assert_eq!(column[0], 180.5);
        assert!(column[1].is_nan());
    }

    #[test]
    fn test_replace_column_keeps_position() {
        let dir = tempdir().unwrap();
        let mut table =
            SeriesTable::open_or_create(dir.path().join("t.csv"), DuplicatePolicy::Replace).unwrap();
        let rows = labels(&["2000-01-16"]);
        table.insert_series("a", &rows, &[1.0]).unwrap();
        table.insert_series("b", &rows, &[2.0]).unwrap();
        let outcome = table.insert_series("a", &rows, &[3.0]).unwrap();

        assert_eq!(outcome, InsertOutcome::Replaced);
        assert_eq!(table.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(table.column("a").unwrap(), &[3.0]);
    }

    #[test]
    fn test_rows_align_on_labels() {
        let dir = tempdir().unwrap();
        let mut table =
            SeriesTable::open_or_create(dir.path().join("t.csv"), DuplicatePolicy::Replace).unwrap();
        table
            .insert_series("a", &labels(&["2000-01-16", "2000-02-15"]), &[1.0, 2.0])
            .unwrap();
        table
            .insert_series("b", &labels(&["2000-02-15", "2000-03-16"]), &[5.0, 6.0])
            .unwrap();

        assert_eq!(table.labels().len(), 3);
        let a = table.column("a").unwrap();
        assert_eq!(&a[..2], &[1.0, 2.0]);
        assert!(a[2].is_nan());
        let b = table.column("b").unwrap();
        assert!(b[0].is_nan());
        assert_eq!(&b[1..], &[5.0, 6.0]);
    }

    #[test]
    fn test_skip_and_error_policies() {
        let dir = tempdir().unwrap();
        let rows = labels(&["2000-01-16"]);

        let mut skip = SeriesTable::open_or_create(dir.path().join("s.csv"), DuplicatePolicy::Skip).unwrap();
        skip.insert_series("a", &rows, &[1.0]).unwrap();
        assert_eq!(skip.insert_series("a", &rows, &[9.0]).unwrap(), InsertOutcome::Skipped);
        assert_eq!(skip.column("a").unwrap(), &[1.0]);

        let mut strict = SeriesTable::open_or_create(dir.path().join("e.csv"), DuplicatePolicy::Error).unwrap();
        strict.insert_series("a", &rows, &[1.0]).unwrap();
        assert!(strict.insert_series("a", &rows, &[9.0]).is_err());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let mut table =
            SeriesTable::open_or_create(dir.path().join("t.csv"), DuplicatePolicy::Replace).unwrap();
        assert!(table.insert_series("a", &labels(&["x"]), &[1.0, 2.0]).is_err());
    }
}
