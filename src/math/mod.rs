pub mod interpolate;
pub mod regrid;
pub mod stats;

pub use interpolate::*;
pub use regrid::*;
pub use stats::*;
