//! Non-parametric trend detection.

mod engine;
pub mod mann_kendall;

pub use engine::{TrendEngine, TrendFields};
pub use mann_kendall::{mann_kendall, original_test, sens_slope, TrendDirection, TrendTest};
