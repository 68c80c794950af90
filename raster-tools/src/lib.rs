pub mod utils;
pub use rastercalc::{Error, Result};

pub mod tracker;
pub use tracker::Tracker;

pub mod cli;
