//! Named collections of arrays sharing coordinates.

use std::collections::BTreeMap;

use crate::array::{ChunkedArray, Value};
use crate::axis::Axis;
use crate::error::{ArrayError, Result};

/// A set of named variables whose shared axes have identical coordinates.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    variables: BTreeMap<String, ChunkedArray<Value>>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge arrays into one dataset.
    ///
    /// Fails with [`ArrayError::AxisMismatch`] when two arrays carry an axis
    /// of the same name with different coordinates.
    pub fn merge(arrays: impl IntoIterator<Item = ChunkedArray<Value>>) -> Result<Self> {
        let mut dataset = Self::new();
        for array in arrays {
            dataset.insert(array)?;
        }
        Ok(dataset)
    }

    /// Add or replace a variable.
    pub fn insert(&mut self, array: ChunkedArray<Value>) -> Result<()> {
        for axis in array.axes() {
            if let Some(existing) = self.find_axis(axis.name(), Some(array.name())) {
                if existing != axis {
                    return Err(ArrayError::axis_mismatch(
                        format!("{}[{}]", existing.name(), existing.len()),
                        format!("{}[{}] on '{}'", axis.name(), axis.len(), array.name()),
                    ));
                }
            }
        }
        self.variables.insert(array.name().to_string(), array);
        Ok(())
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&ChunkedArray<Value>> {
        self.variables.get(name)
    }

    /// Look up a variable, failing if absent.
    pub fn variable(&self, name: &str) -> Result<&ChunkedArray<Value>> {
        self.get(name)
            .ok_or_else(|| ArrayError::variable_not_found(name))
    }

    /// Check whether a variable exists.
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Remove a variable.
    pub fn remove(&mut self, name: &str) -> Option<ChunkedArray<Value>> {
        self.variables.remove(name)
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    /// Iterate over variables in name order.
    pub fn variables(&self) -> impl Iterator<Item = &ChunkedArray<Value>> {
        self.variables.values()
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Check if the dataset has no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Every distinct axis used by any variable.
    pub fn axes(&self) -> Vec<Axis> {
        let mut axes: Vec<Axis> = Vec::new();
        for array in self.variables.values() {
            for axis in array.axes() {
                if !axes.iter().any(|a| a.name() == axis.name()) {
                    axes.push(axis.clone());
                }
            }
        }
        axes
    }

    /// Check whether any variable has an axis with this name.
    pub fn has_axis(&self, name: &str) -> bool {
        self.find_axis(name, None).is_some()
    }

    /// Rename an axis on every variable that carries it.
    pub fn rename_axis(&self, old: &str, new: &str) -> Result<Self> {
        if !self.has_axis(old) {
            return Err(ArrayError::axis_not_found(old));
        }
        let mut renamed = Self::new();
        for array in self.variables.values() {
            let array = if array.has_axis(old) {
                array.rename_axis(old, new)?
            } else {
                array.clone()
            };
            renamed.insert(array)?;
        }
        Ok(renamed)
    }

    fn find_axis(&self, name: &str, skip: Option<&str>) -> Option<&Axis> {
        self.variables
            .values()
            .filter(|v| Some(v.name()) != skip)
            .flat_map(|v| v.axes())
            .find(|a| a.name() == name)
    }
}
