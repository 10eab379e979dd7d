use chrono::NaiveDateTime;
use clap::ArgMatches;
use std::path::{Path, PathBuf};

use crate::data_io::{DuplicatePolicy, MaskConvention};
use crate::math::interpolate::Interpolation;
use crate::time_utils::{parse_datetime, TimeError};

/// Offset between Celsius and Kelvin
pub const KELVIN_OFFSET: f64 = 273.15;

/// December, January, February
pub const DJF_MONTHS: [u32; 3] = [12, 1, 2];

/// CMIP6 models in the ensemble, in index order
pub const MODEL_LIST: [&str; 33] = [
    "ACCESS-CM2",
    "ACCESS-ESM1-5",
    "AWI-CM-1-1-MR",
    "BCC-CSM2-MR",
    "CAMS-CSM1-0",
    "CanESM5",
    "CESM2",
    "CESM2-WACCM",
    "CMCC-CM2-SR5",
    "CNRM-CM6-1",
    "CNRM-CM6-1-HR",
    "CNRM-ESM2-1",
    "EC-Earth3",
    "EC-Earth3-Veg",
    "FGOALS-f3-L",
    "FGOALS-g3",
    "GFDL-CM4",
    "GFDL-ESM4",
    "GISS-E2-1-G",
    "HadGEM3-GC31-LL",
    "HadGEM3-GC31-MM",
    "INM-CM4-8",
    "INM-CM5-0",
    "IPSL-CM6A-LR",
    "MIROC6",
    "MIROC-ES2L",
    "MPI-ESM1-2-HR",
    "MPI-ESM1-2-LR",
    "MPI-ESM2-0",
    "NESM3",
    "NorESM2-LM",
    "NorESM2-MM",
    "TaiESM1",
];

/// Closed datetime window given as `YYYY-MM-DD[THH:MM:SS]` bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: &'static str,
    pub end: &'static str,
}

impl TimeWindow {
    pub const fn new(start: &'static str, end: &'static str) -> Self {
        Self { start, end }
    }

    pub fn bounds(&self) -> Result<(NaiveDateTime, NaiveDateTime), TimeError> {
        Ok((parse_datetime(self.start)?, parse_datetime(self.end)?))
    }
}

/// Historical DJF window for the change composite
pub const CHANGE_HISTORICAL: TimeWindow =
    TimeWindow::new("1850-01-01T12:00:00", "1900-01-01T12:00:00");
/// Future DJF window for the change composite
pub const CHANGE_FUTURE: TimeWindow = TimeWindow::new("2050-02-16T12:00:00", "2101-01-01T12:00:00");
/// Historical window for the zonal difference composite
pub const ZONAL_HISTORICAL: TimeWindow = TimeWindow::new("1851-01-01", "1900-12-01");
/// Future window for the zonal difference composite
pub const ZONAL_FUTURE: TimeWindow = TimeWindow::new("2051-01-01", "2100-12-01");

/// Names a model uses for its horizontal coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateNaming {
    /// `lon` / `lat`
    Short,
    /// `longitude` / `latitude`
    Long,
}

impl CoordinateNaming {
    pub fn lon_name(self) -> &'static str {
        match self {
            CoordinateNaming::Short => "lon",
            CoordinateNaming::Long => "longitude",
        }
    }

    pub fn lat_name(self) -> &'static str {
        match self {
            CoordinateNaming::Short => "lat",
            CoordinateNaming::Long => "latitude",
        }
    }

    /// The other naming scheme, tried when the preferred names are absent
    pub fn alternate(self) -> Self {
        match self {
            CoordinateNaming::Short => CoordinateNaming::Long,
            CoordinateNaming::Long => CoordinateNaming::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMatch {
    Exact(&'static str),
    Contains(&'static str),
}

impl ModelMatch {
    pub fn matches(&self, model: &str) -> bool {
        match self {
            ModelMatch::Exact(name) => model == *name,
            ModelMatch::Contains(fragment) => model.contains(fragment),
        }
    }
}

/// Time and latitude clip excluding corrupted records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeClip {
    pub window: TimeWindow,
    pub lat_min: f64,
    pub lat_max: f64,
}

/// Per-model quirks applied while loading and normalizing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    pub matcher: Option<ModelMatch>,
    pub naming: CoordinateNaming,
    pub clip: Option<TimeClip>,
}

impl ModelProfile {
    pub const STANDARD: ModelProfile = ModelProfile {
        matcher: None,
        naming: CoordinateNaming::Short,
        clip: None,
    };

    /// First matching entry of [`MODEL_PROFILES`], or the standard profile
    pub fn for_model(model: &str) -> ModelProfile {
        MODEL_PROFILES
            .iter()
            .find(|profile| profile.matcher.map_or(false, |m| m.matches(model)))
            .copied()
            .unwrap_or(ModelProfile::STANDARD)
    }
}

pub const MODEL_PROFILES: [ModelProfile; 2] = [
    ModelProfile {
        matcher: Some(ModelMatch::Exact("MCM-UA-1-0")),
        naming: CoordinateNaming::Long,
        clip: None,
    },
    ModelProfile {
        matcher: Some(ModelMatch::Contains("EC-Earth3")),
        naming: CoordinateNaming::Short,
        clip: Some(TimeClip {
            window: TimeWindow::new("1850-01-16T12:00:00", "2100-12-16T12:00:00"),
            lat_min: -20.0,
            lat_max: 20.0,
        }),
    },
];

/// Pipeline options
#[derive(Clone, Debug)]
pub struct Config {
    /// Root holding `CMIP6/<model>/` directories
    pub data_dir: PathBuf,
    /// Observational SST reference (variable `sst`, Celsius)
    pub obs_file: PathBuf,
    /// Where composite NetCDF files and CSV tables are written
    pub output_dir: PathBuf,
    pub mask_convention: MaskConvention,
    pub interpolation: Interpolation,
    pub duplicate_policy: DuplicatePolicy,
    /// Rolling window of the Niño-3.4 climatology, in years
    pub climatology_window: usize,
    /// Entries at each end of a climatology that are backfilled
    pub backfill_edge: usize,
    /// Keep iterating the ensemble after a model fails
    pub keep_going: bool,
    /// Compute indices without a land mask
    pub skip_mask: bool,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            obs_file: PathBuf::from("sst.mnmean.nc"),
            output_dir: PathBuf::from("."),
            mask_convention: MaskConvention::Detect,
            interpolation: Interpolation::Linear,
            duplicate_policy: DuplicatePolicy::Replace,
            climatology_window: 5,
            backfill_edge: 15,
            keep_going: false,
            skip_mask: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Build a configuration from the global CLI options.
    ///
    /// `--obs-file` defaults to `sst.mnmean.nc` inside the data directory.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(dir) = matches.get_one::<String>("data-dir") {
            config.data_dir = PathBuf::from(dir);
        }
        config.obs_file = match matches.get_one::<String>("obs-file") {
            Some(file) => PathBuf::from(file),
            None => config.data_dir.join("sst.mnmean.nc"),
        };
        if let Some(dir) = matches.get_one::<String>("output-dir") {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(value) = matches.get_one::<String>("mask-convention") {
            config.mask_convention = value.parse()?;
        }
        if let Some(value) = matches.get_one::<String>("interpolation") {
            config.interpolation = value.parse()?;
        }
        if let Some(value) = matches.get_one::<String>("on-duplicate") {
            config.duplicate_policy = value.parse()?;
        }
        if let Some(value) = matches.get_one::<String>("climatology-window") {
            config.climatology_window = value
                .parse()
                .map_err(|_| format!("Invalid climatology window: {}", value))?;
        }
        if let Some(value) = matches.get_one::<String>("backfill-edge") {
            config.backfill_edge = value
                .parse()
                .map_err(|_| format!("Invalid backfill edge: {}", value))?;
        }

        config.keep_going = matches.get_flag("keep-going");
        config.verbose = matches.get_flag("verbose");

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.climatology_window == 0 {
            return Err("Climatology window must be at least one year".to_string());
        }
        if self.output_dir.is_file() {
            return Err(format!(
                "Output directory is a file: {}",
                self.output_dir.display()
            ));
        }
        Ok(())
    }

    /// Directory holding one model's realization and mask files
    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.data_dir.join("CMIP6").join(model)
    }

    pub fn output_path(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_list_has_ensemble() {
        assert_eq!(MODEL_LIST.len(), 33);
        assert_eq!(MODEL_LIST[0], "ACCESS-CM2");
        assert_eq!(MODEL_LIST[12], "EC-Earth3");
        assert_eq!(MODEL_LIST[32], "TaiESM1");
    }

    #[test]
    fn test_profile_lookup() {
        let mcm = ModelProfile::for_model("MCM-UA-1-0");
        assert_eq!(mcm.naming, CoordinateNaming::Long);
        assert!(mcm.clip.is_none());

        let ec = ModelProfile::for_model("EC-Earth3-Veg");
        assert_eq!(ec.naming, CoordinateNaming::Short);
        let clip = ec.clip.unwrap();
        assert_eq!(clip.lat_min, -20.0);
        assert_eq!(clip.window.start, "1850-01-16T12:00:00");

        assert_eq!(ModelProfile::for_model("CanESM5"), ModelProfile::STANDARD);
        // exact match only
        assert_eq!(
            ModelProfile::for_model("MCM-UA-1-0-X").naming,
            CoordinateNaming::Short
        );
    }

    #[test]
    fn test_coordinate_naming() {
        assert_eq!(CoordinateNaming::Short.lon_name(), "lon");
        assert_eq!(CoordinateNaming::Long.lat_name(), "latitude");
        assert_eq!(CoordinateNaming::Long.alternate(), CoordinateNaming::Short);
    }

    #[test]
    fn test_time_windows_parse() {
        for window in [CHANGE_HISTORICAL, CHANGE_FUTURE, ZONAL_HISTORICAL, ZONAL_FUTURE] {
            let (start, end) = window.bounds().unwrap();
            assert!(start < end);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.climatology_window, 5);
        assert_eq!(config.backfill_edge, 15);
        assert_eq!(
            config.model_dir("CESM2"),
            PathBuf::from(".").join("CMIP6").join("CESM2")
        );
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = Config {
            climatology_window: 0,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().contains("Climatology window"));
    }

    #[test]
    fn test_validate_rejects_file_output_dir() {
        let config = Config {
            output_dir: PathBuf::from("Cargo.toml"),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
