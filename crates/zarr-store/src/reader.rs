//! Zarr V3 reader: the load boundary of the pipeline.
//!
//! NaN values on disk become missing (`None`) here; nothing past this point
//! sees NaN as a data value.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chunked_array::{ArrayError, Axis, ChunkLayout, ChunkedArray, Dataset, Value};
use serde_json::Value as Json;
use tracing::{debug, trace};
use walkdir::WalkDir;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::coords::{self, Encoded, COORD_KIND_ATTR, DIMENSIONS_ATTR};
use crate::error::{Result, StoreError};

/// Store path of a node (`/name` or `/group/name`).
pub(crate) fn node_path(group: Option<&str>, name: &str) -> String {
    match group {
        Some(g) => format!("/{}/{}", g, name),
        None => format!("/{}", name),
    }
}

/// Directory of a group or node on disk.
pub(crate) fn node_dir(root: &Path, group: Option<&str>, name: Option<&str>) -> PathBuf {
    let mut dir = root.to_path_buf();
    if let Some(g) = group {
        dir.push(g);
    }
    if let Some(n) = name {
        dir.push(n);
    }
    dir
}

/// Kind of node found in a store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A data variable
    Variable,
    /// A coordinate array
    Coordinate,
    /// A group
    Group,
}

/// Reader for Zarr V3 datasets on the local filesystem.
pub struct ZarrDatasetReader {
    root: PathBuf,
    store: Arc<FilesystemStore>,
}

impl ZarrDatasetReader {
    /// Open an existing store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::NotFound(root.display().to_string()));
        }
        let store = FilesystemStore::new(&root)
            .map_err(|e| StoreError::open_failed(root.display().to_string(), e))?;
        Ok(Self {
            root,
            store: Arc::new(store),
        })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Kind of the node at `group`/`name`, if it exists.
    pub fn node_kind(&self, group: Option<&str>, name: &str) -> Option<NodeKind> {
        let metadata = node_dir(&self.root, group, Some(name)).join("zarr.json");
        let text = std::fs::read_to_string(metadata).ok()?;
        let json: Json = serde_json::from_str(&text).ok()?;
        match json.get("node_type").and_then(Json::as_str) {
            Some("group") => Some(NodeKind::Group),
            Some("array") => {
                let is_coord = json
                    .get("attributes")
                    .and_then(|a| a.get(COORD_KIND_ATTR))
                    .is_some();
                Some(if is_coord {
                    NodeKind::Coordinate
                } else {
                    NodeKind::Variable
                })
            }
            _ => None,
        }
    }

    /// Check whether any array or group exists at `group`/`name`.
    pub fn has_node(&self, group: Option<&str>, name: &str) -> bool {
        self.node_kind(group, name).is_some()
    }

    /// Check whether a data variable exists.
    pub fn has_variable(&self, group: Option<&str>, name: &str) -> bool {
        self.node_kind(group, name) == Some(NodeKind::Variable)
    }

    /// Names of data variables in the store root or a group, sorted.
    pub fn list_variables(&self, group: Option<&str>) -> Result<Vec<String>> {
        self.list(group, NodeKind::Variable)
    }

    /// Names of groups directly under the store root, sorted.
    pub fn list_groups(&self) -> Result<Vec<String>> {
        self.list(None, NodeKind::Group)
    }

    fn list(&self, group: Option<&str>, kind: NodeKind) -> Result<Vec<String>> {
        let dir = node_dir(&self.root, group, None);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(dir.display().to_string()));
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::read_failed(dir.display().to_string(), e))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.node_kind(group, &name) == Some(kind) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a coordinate array back into an axis.
    pub fn read_coordinate(&self, group: Option<&str>, name: &str) -> Result<Axis> {
        let path = node_path(group, name);
        let array = Array::open(self.store.clone(), &path)
            .map_err(|e| StoreError::open_failed(&path, e))?;
        let kind = array
            .attributes()
            .get(COORD_KIND_ATTR)
            .and_then(Json::as_str)
            .ok_or_else(|| StoreError::invalid_metadata(&path, "missing coord_kind"))?
            .to_string();
        let len = array.shape().first().copied().unwrap_or(0);
        let subset = ArraySubset::new_with_start_shape(vec![0], vec![len])
            .map_err(|e| StoreError::read_failed(&path, e))?;

        let encoded = if coords::is_integer_kind(&kind) {
            Encoded::Int(
                array
                    .retrieve_array_subset_elements::<i64>(&subset)
                    .map_err(|e| StoreError::read_failed(&path, e))?,
            )
        } else {
            Encoded::Float(
                array
                    .retrieve_array_subset_elements::<f64>(&subset)
                    .map_err(|e| StoreError::read_failed(&path, e))?,
            )
        };
        Ok(Axis::new(name, coords::decode(&path, &kind, encoded)?))
    }

    /// Open a data variable, keeping the on-disk chunking.
    ///
    /// Only metadata and coordinates are read here. Chunks are read from
    /// disk when the returned array is evaluated, and again on every
    /// evaluation.
    pub fn read_variable(&self, group: Option<&str>, name: &str) -> Result<ChunkedArray<Value>> {
        let path = node_path(group, name);
        if !self.has_variable(group, name) {
            return Err(StoreError::NotFound(path));
        }
        let array = Array::open(self.store.clone(), &path)
            .map_err(|e| StoreError::open_failed(&path, e))?;
        let attrs = array.attributes();

        let dims: Vec<String> = attrs
            .get(DIMENSIONS_ATTR)
            .and_then(Json::as_array)
            .ok_or_else(|| StoreError::invalid_metadata(&path, "missing _ARRAY_DIMENSIONS"))?
            .iter()
            .map(|d| {
                d.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| StoreError::invalid_metadata(&path, "dimension name is not a string"))
            })
            .collect::<Result<_>>()?;
        let units = attrs.get("units").and_then(Json::as_str).map(str::to_string);

        let shape: Vec<usize> = array.shape().iter().map(|&s| s as usize).collect();
        if dims.len() != shape.len() {
            return Err(StoreError::invalid_metadata(
                &path,
                format!("{} dimension names for {} axes", dims.len(), shape.len()),
            ));
        }
        let axes = dims
            .iter()
            .map(|d| self.read_coordinate(group, d))
            .collect::<Result<Vec<_>>>()?;
        for (axis, &len) in axes.iter().zip(&shape) {
            if axis.len() != len {
                return Err(StoreError::invalid_metadata(
                    &path,
                    format!("coordinate '{}' has {} labels, axis has {}", axis.name(), axis.len(), len),
                ));
            }
        }

        let origin = vec![0u64; shape.len()];
        let chunk_shape = array
            .chunk_grid()
            .chunk_shape(&origin, array.shape())
            .map_err(|e| StoreError::invalid_metadata(&path, e))?
            .ok_or_else(|| StoreError::invalid_metadata(&path, "missing chunk shape"))?;
        let chunk_sizes: Vec<usize> = chunk_shape.iter().map(|c| c.get() as usize).collect();
        let layout = ChunkLayout::new(shape, chunk_sizes.clone())?;

        debug!(
            path = %path,
            chunks = layout.num_chunks(),
            "Opened variable"
        );

        let array = Arc::new(array);
        let variable = ChunkedArray::from_loader(name, axes, chunk_sizes, move |c| {
            let (origin, shape) = layout.chunk_region(c);
            let subset = ArraySubset::new_with_start_shape(
                origin.iter().map(|&o| o as u64).collect(),
                shape.iter().map(|&s| s as u64).collect(),
            )
            .map_err(|e| ArrayError::load_failed(&path, c, e))?;
            let data: Vec<f32> = array
                .retrieve_array_subset_elements(&subset)
                .map_err(|e| ArrayError::load_failed(&path, c, e))?;
            trace!(path = %path, chunk = c, "Loaded chunk");
            Ok(data
                .into_iter()
                .map(|v| if v.is_nan() { None } else { Some(v as f64) })
                .collect())
        })?;
        Ok(match units {
            Some(units) => variable.with_units(units),
            None => variable,
        })
    }

    /// Read several variables into one dataset.
    pub fn read_dataset(&self, group: Option<&str>, names: &[&str]) -> Result<Dataset> {
        let arrays = names
            .iter()
            .map(|name| self.read_variable(group, name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset::merge(arrays)?)
    }
}
