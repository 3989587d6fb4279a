//! Labeled, chunked N-dimensional arrays with deferred evaluation
//!
//! This crate provides the array model used by the climate index pipeline.
//! Arrays carry named axes with coordinate labels and are partitioned into
//! rectangular chunks. Every transform builds a node in an explicit task
//! graph instead of computing eagerly:
//!
//! - **Chunk-local work**: elementwise maps and zips run one task per chunk
//! - **Gathers**: rechunking, grouping and core-dimension kernels read the
//!   chunks they need from their parents
//! - **Parallel execution**: `compute` evaluates chunks on the rayon pool;
//!   a block read by several tasks is shared within one evaluation and
//!   released after its last reader, so shared parents run once
//! - **Lazy sources**: `from_loader` reads chunks only when they are needed
//!
//! # Architecture
//!
//! ```text
//! ChunkedArray::from_vec / from_blocks   (in-memory source nodes)
//! ChunkedArray::from_loader              (chunks read on demand)
//!      │
//!      ├─► map / zip_with                 (one task per chunk)
//!      ├─► rolling_construct              (chunk + halo along one axis)
//!      ├─► groupby(..).reduce / resample  (gather along the grouped axis)
//!      ├─► zip_grouped                    (broadcast a per-group table)
//!      ├─► rechunk                        (explicit repartition)
//!      └─► apply_ufunc                    (core dims must be one chunk)
//!               │
//!               ▼
//!          TaskGraph ──► compute() / try_for_each_chunk() on rayon
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chunked_array::{Axis, Chunking, ChunkedArray};
//!
//! let temps = ChunkedArray::from_vec("t2m", axes, data, &[("latitude", Chunking::Size(25))])?;
//! let celsius = temps.map("kelvin_to_celsius", |v| v.map(|k| k - 273.15));
//! let values = celsius.compute()?;
//! ```

pub mod array;
pub mod axis;
pub mod dataset;
pub mod error;
mod eval;
pub mod graph;
pub mod layout;
pub mod ops;

// Re-export commonly used types at crate root
pub use array::{ChunkedArray, Element, Value};
pub use axis::{ensure_same_axes, Axis, Coord};
pub use dataset::Dataset;
pub use error::{ArrayError, Result};
pub use graph::{GraphNode, NodeId, Task, TaskGraph, TaskKey};
pub use layout::{ChunkLayout, Chunking};
pub use ops::{Aggregation, GroupBy, GroupKey, ResampleRule, Resampled, UfuncOutput};
