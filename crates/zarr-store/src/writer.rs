//! Zarr V3 writer for chunked datasets.
//!
//! Variables are written as `Float32` arrays with a NaN fill value; missing
//! values become NaN on disk. Each variable's axes are written once per
//! group as coordinate arrays (see [`crate::coords`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chunked_array::{Axis, ChunkedArray, Dataset, Value};
use serde_json::json;
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::config::{StoreConfig, ZarrCompression};
use crate::coords::{self, Encoded, DIMENSIONS_ATTR};
use crate::error::{Result, StoreError};
use crate::reader::{node_dir, node_path, ZarrDatasetReader};

/// How a write treats existing content at the target location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole store (or group) with the dataset.
    Overwrite,
    /// Add or replace only the dataset's variables; everything else in the
    /// store is left untouched.
    Append,
}

/// Summary of a completed write.
#[derive(Debug, Clone)]
pub struct WriteReport {
    /// Store root.
    pub root: PathBuf,
    /// Group written to, if any.
    pub group: Option<String>,
    /// Variables written.
    pub variables: Vec<String>,
    /// Coordinate arrays created by this write.
    pub coordinates: Vec<String>,
    /// Uncompressed bytes of variable data written.
    pub bytes_written: u64,
}

/// Writer for Zarr V3 datasets on the local filesystem.
pub struct ZarrDatasetWriter {
    config: StoreConfig,
}

impl ZarrDatasetWriter {
    /// Create a new writer with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Write a dataset to `root`, optionally inside `group`.
    pub fn write(
        &self,
        root: &Path,
        group: Option<&str>,
        dataset: &Dataset,
        mode: WriteMode,
    ) -> Result<WriteReport> {
        let root_str = root.display().to_string();
        let target = node_dir(root, group, None);

        if mode == WriteMode::Overwrite && target.exists() {
            debug!(path = %target.display(), "Removing existing store content");
            std::fs::remove_dir_all(&target)?;
        }
        std::fs::create_dir_all(&target)?;

        let store = Arc::new(
            FilesystemStore::new(root).map_err(|e| StoreError::open_failed(&root_str, e))?,
        );
        self.ensure_group(&store, root, None)?;
        if group.is_some() {
            self.ensure_group(&store, root, group)?;
        }

        // Check every shared coordinate before touching any variable.
        let reader = ZarrDatasetReader::open(root)?;
        let mut new_coords = Vec::new();
        for axis in dataset.axes() {
            if reader.has_node(group, axis.name()) {
                let existing = reader.read_coordinate(group, axis.name())?;
                if existing != axis {
                    return Err(StoreError::CoordinateMismatch {
                        path: node_path(group, axis.name()),
                        axis: axis.name().to_string(),
                    });
                }
            } else {
                new_coords.push(axis);
            }
        }

        for axis in &new_coords {
            self.write_coordinate(&store, group, axis)?;
        }

        let mut bytes_written = 0;
        let mut variables = Vec::with_capacity(dataset.len());
        for array in dataset.variables() {
            let dir = node_dir(root, group, Some(array.name()));
            if dir.exists() {
                debug!(variable = %array.name(), "Replacing existing variable");
                std::fs::remove_dir_all(&dir)?;
            }
            bytes_written += self.write_variable(&store, group, array)?;
            variables.push(array.name().to_string());
        }

        info!(
            root = %root_str,
            group = group.unwrap_or("/"),
            variables = ?variables,
            bytes = bytes_written,
            mode = ?mode,
            "Wrote Zarr dataset"
        );

        Ok(WriteReport {
            root: root.to_path_buf(),
            group: group.map(str::to_string),
            variables,
            coordinates: new_coords.iter().map(|a| a.name().to_string()).collect(),
            bytes_written,
        })
    }

    fn ensure_group(&self, store: &Arc<FilesystemStore>, root: &Path, group: Option<&str>) -> Result<()> {
        if node_dir(root, group, None).join("zarr.json").exists() {
            return Ok(());
        }
        let path = match group {
            Some(g) => format!("/{}", g),
            None => "/".to_string(),
        };
        let mut attrs = serde_json::Map::new();
        if let Some(g) = group {
            attrs.insert("name".to_string(), json!(g));
        }
        let mut builder = GroupBuilder::new();
        builder.attributes(attrs);
        let zarr_group = builder
            .build(store.clone(), &path)
            .map_err(|e| StoreError::write_failed(&path, e))?;
        zarr_group
            .store_metadata()
            .map_err(|e| StoreError::write_failed(&path, e))
    }

    fn write_coordinate(&self, store: &Arc<FilesystemStore>, group: Option<&str>, axis: &Axis) -> Result<()> {
        let path = node_path(group, axis.name());
        let (encoded, attrs) = coords::encode(axis);
        let len = axis.len() as u64;
        let chunk_grid: zarrs::array::ChunkGrid = vec![len.max(1)]
            .try_into()
            .map_err(|e| StoreError::ConfigError(format!("{:?}", e)))?;
        let subset = ArraySubset::new_with_start_shape(vec![0], vec![len])
            .map_err(|e| StoreError::write_failed(&path, e))?;

        match encoded {
            Encoded::Int(values) => {
                let array = ArrayBuilder::new(vec![len], DataType::Int64, chunk_grid, FillValue::from(0i64))
                    .attributes(attrs)
                    .build(store.clone(), &path)
                    .map_err(|e| StoreError::write_failed(&path, e))?;
                array
                    .store_metadata()
                    .map_err(|e| StoreError::write_failed(&path, e))?;
                array
                    .store_array_subset_elements(&subset, &values)
                    .map_err(|e| StoreError::write_failed(&path, e))?;
            }
            Encoded::Float(values) => {
                let array = ArrayBuilder::new(vec![len], DataType::Float64, chunk_grid, FillValue::from(f64::NAN))
                    .attributes(attrs)
                    .build(store.clone(), &path)
                    .map_err(|e| StoreError::write_failed(&path, e))?;
                array
                    .store_metadata()
                    .map_err(|e| StoreError::write_failed(&path, e))?;
                array
                    .store_array_subset_elements(&subset, &values)
                    .map_err(|e| StoreError::write_failed(&path, e))?;
            }
        }
        debug!(path = %path, len = len, "Wrote coordinate");
        Ok(())
    }

    /// Write one variable, chunked for disk. Returns uncompressed bytes written.
    fn write_variable(
        &self,
        store: &Arc<FilesystemStore>,
        group: Option<&str>,
        array: &ChunkedArray<Value>,
    ) -> Result<u64> {
        let path = node_path(group, array.name());
        let array = array.rechunk(&self.config.disk_chunking(array.axes()))?;
        let zarr = self.build_array(store, &path, &array)?;
        zarr.store_metadata()
            .map_err(|e| StoreError::write_failed(&path, e))?;

        let layout = array.layout();
        array.try_for_each_chunk(|c, block: &[Value]| {
            let (origin, shape) = layout.chunk_region(c);
            let data: Vec<f32> = block
                .iter()
                .map(|v| v.map(|x| x as f32).unwrap_or(f32::NAN))
                .collect();
            let subset = ArraySubset::new_with_start_shape(
                origin.iter().map(|&o| o as u64).collect(),
                shape.iter().map(|&s| s as u64).collect(),
            )
            .map_err(|e| StoreError::write_failed(&path, e))?;
            zarr.store_array_subset_elements(&subset, &data)
                .map_err(|e| StoreError::write_failed(&path, e))
        })?;

        let bytes = (array.len() * std::mem::size_of::<f32>()) as u64;
        debug!(
            path = %path,
            chunks = array.num_chunks(),
            bytes = bytes,
            "Wrote variable"
        );
        Ok(bytes)
    }

    fn build_array(
        &self,
        store: &Arc<FilesystemStore>,
        path: &str,
        array: &ChunkedArray<Value>,
    ) -> Result<Array<FilesystemStore>> {
        let mut attrs = serde_json::Map::new();
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!(array.axis_names()));
        if let Some(units) = array.units() {
            attrs.insert("units".to_string(), json!(units));
        }

        let shape: Vec<u64> = array.shape().iter().map(|&s| s as u64).collect();
        let chunk_grid: zarrs::array::ChunkGrid = array
            .layout()
            .chunk_sizes()
            .iter()
            .map(|&c| c as u64)
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|e| StoreError::ConfigError(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(shape, DataType::Float32, chunk_grid, FillValue::from(f32::NAN));
        let mut builder = binding.attributes(attrs);

        if self.config.compression != ZarrCompression::None {
            let codec = self.create_compression_codec()?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        builder
            .build(store.clone(), path)
            .map_err(|e| StoreError::write_failed(path, e))
    }

    fn create_compression_codec(&self) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| StoreError::ConfigError("Invalid compression level".to_string()))?;

        let shuffle = if self.config.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.config.shuffle {
            Some(std::mem::size_of::<f32>())
        } else {
            None
        };

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(StoreError::ConfigError(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| StoreError::ConfigError(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}
