pub mod analysis;
pub mod composite;
pub mod config;
pub mod data_io;
pub mod indices;
pub mod logging;
pub mod math;
pub mod naming;
pub mod normalize;
pub mod region;
pub mod time_utils;

pub use time_utils::*;
