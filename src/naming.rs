//! Realization identifiers parsed from CMIP6 file names.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// MIP tables that can precede the model name in a file name
const MIP_TABLES: [&str; 14] = [
    "Amon", "Omon", "Lmon", "LImon", "SImon", "Emon", "AERmon", "CFmon", "day", "Oday", "fx",
    "Ofx", "Efx", "6hrPlev",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NamingError {
    #[error("No r<R>i<I>p<P>f<F> token in '{0}'")]
    MissingRipf(String),

    #[error("No model name in '{0}'")]
    MissingModel(String),
}

/// One model run: `<model> ... r<R>i<I>p<P>f<F>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Realization {
    pub model: String,
    pub realization: u32,
    pub initialization: u32,
    pub physics: u32,
    pub forcing: u32,
}

/// Parse a token of the form `r<R>i<I>p<P>f<F>`
fn parse_ripf(token: &str) -> Option<[u32; 4]> {
    let mut indices = [0u32; 4];
    let mut rest = token;
    for (slot, key) in indices.iter_mut().zip(['r', 'i', 'p', 'f']) {
        rest = rest.strip_prefix(key)?;
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        *slot = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
    }
    rest.is_empty().then_some(indices)
}

/// File stem with directory and `.nc` extension removed
fn file_stem(name: &str) -> &str {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);
    base.strip_suffix(".nc").unwrap_or(base)
}

impl Realization {
    pub fn parse(name: &str) -> Result<Self, NamingError> {
        let stem = file_stem(name);
        let tokens: Vec<&str> = stem.split('_').filter(|t| !t.is_empty()).collect();

        let [realization, initialization, physics, forcing] = tokens
            .iter()
            .find_map(|t| parse_ripf(t))
            .ok_or_else(|| NamingError::MissingRipf(name.to_string()))?;

        let model_position = if tokens.len() > 2 && MIP_TABLES.contains(&tokens[1]) {
            2
        } else {
            0
        };
        let model = tokens
            .get(model_position)
            .filter(|t| parse_ripf(t).is_none())
            .ok_or_else(|| NamingError::MissingModel(name.to_string()))?;

        Ok(Self {
            model: model.to_string(),
            realization,
            initialization,
            physics,
            forcing,
        })
    }
}

impl FromStr for Realization {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Realization::parse(s)
    }
}

impl fmt::Display for Realization {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: Realization {}, Initialization {}, Physics {}, Forcing {}",
            self.model, self.realization, self.initialization, self.physics, self.forcing
        )
    }
}

/// Short id of a realization file: `ts_Amon_` prefix dropped, cut after the ripf token.
///
/// `ts_Amon_CESM2_historical_r1i1p1f1_gn_185001-201412.nc` gives
/// `CESM2_historical_r1i1p1f1`.
pub fn realization_id(file_name: &str) -> Option<String> {
    let stem = file_stem(file_name);
    let stem = stem.strip_prefix("ts_Amon_").unwrap_or(stem);
    let tokens: Vec<&str> = stem.split('_').collect();
    let end = tokens.iter().position(|t| parse_ripf(t).is_some())?;
    Some(tokens[..=end].join("_"))
}
