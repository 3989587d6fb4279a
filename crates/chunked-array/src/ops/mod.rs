//! Higher-level transforms built on top of [`crate::ChunkedArray`].

pub mod aggregate;
pub mod groupby;
pub mod rolling;
pub mod ufunc;

pub use aggregate::Aggregation;
pub use groupby::{GroupBy, GroupKey, ResampleRule, Resampled};
pub use ufunc::UfuncOutput;
