//! Zarr V3 storage boundary for chunked climate datasets
//!
//! Reads and writes [`chunked_array::Dataset`]s as Zarr V3 stores on the
//! local filesystem:
//!
//! - **Variables**: `Float32` arrays, NaN fill, `_ARRAY_DIMENSIONS` and
//!   `units` attributes
//! - **Coordinates**: one 1-D array per axis, stored beside the variables
//! - **Groups**: a dataset may be written into a named group of a store
//! - **Append**: adds or replaces variables without touching the rest
//!
//! # Layout
//!
//! ```text
//! indices.zarr/
//!   zarr.json            (root group)
//!   time/ latitude/ longitude/
//!   t2m/ rh/ RH90p/
//!   yearly_stats/
//!     zarr.json          (group)
//!     year/ latitude/ longitude/
//!     WHD/ RHmean/ RHmin/ RHmax/
//! ```
//!
//! # Example
//!
//! ```ignore
//! use zarr_store::{StoreConfig, WriteMode, ZarrDatasetReader, ZarrDatasetWriter};
//!
//! let writer = ZarrDatasetWriter::new(StoreConfig::default());
//! writer.write(Path::new("outputs/indices.zarr"), None, &dataset, WriteMode::Overwrite)?;
//!
//! let reader = ZarrDatasetReader::open("outputs/indices.zarr")?;
//! let rh = reader.read_variable(None, "rh")?;
//! ```

pub mod config;
pub mod coords;
pub mod error;
pub mod reader;
pub mod writer;

// Re-export commonly used types at crate root
pub use config::{StoreConfig, ZarrCompression};
pub use error::{Result, StoreError};
pub use reader::{NodeKind, ZarrDatasetReader};
pub use writer::{WriteMode, WriteReport, ZarrDatasetWriter};
