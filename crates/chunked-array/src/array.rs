//! The chunked array type and its execution stage.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::axis::{describe_axes, ensure_same_axes, Axis};
use crate::error::{ArrayError, Result};
use crate::eval::Evaluation;
use crate::graph::{next_node_id, GraphNode, NodeId, TaskGraph, TaskKey};
use crate::layout::{copy_overlap, ChunkLayout, Chunking};

/// Element types that can be stored in a chunked array.
pub trait Element: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> Element for T {}

/// A numeric value that may be missing.
pub type Value = Option<f64>;

pub(crate) type ChunkFn<T> = Box<dyn Fn(&Evaluation, usize) -> Result<Vec<T>> + Send + Sync>;
pub(crate) type DepFn = Box<dyn Fn(usize) -> Vec<TaskKey> + Send + Sync>;

enum Kernel<T> {
    Source(Vec<Arc<[T]>>),
    Deferred {
        compute: ChunkFn<T>,
        deps: DepFn,
        parents: Vec<Arc<dyn GraphNode>>,
    },
}

/// A graph node: either in-memory blocks or a deferred per-chunk transform.
///
/// Deferred chunks keep nothing between evaluations; within one evaluation
/// a block read by several tasks is shared through the [`Evaluation`].
pub(crate) struct Node<T> {
    id: NodeId,
    op: String,
    num_chunks: usize,
    kernel: Kernel<T>,
}

impl<T: Element> Node<T> {
    pub(crate) fn source(op: impl Into<String>, blocks: Vec<Arc<[T]>>) -> Self {
        Self {
            id: next_node_id(),
            op: op.into(),
            num_chunks: blocks.len(),
            kernel: Kernel::Source(blocks),
        }
    }

    pub(crate) fn deferred(
        op: impl Into<String>,
        num_chunks: usize,
        parents: Vec<Arc<dyn GraphNode>>,
        deps: DepFn,
        compute: ChunkFn<T>,
    ) -> Self {
        Self {
            id: next_node_id(),
            op: op.into(),
            num_chunks,
            kernel: Kernel::Deferred {
                compute,
                deps,
                parents,
            },
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Evaluate (or fetch the shared) block for one chunk.
    pub(crate) fn chunk(&self, evaluation: &Evaluation, index: usize) -> Result<Arc<[T]>> {
        if index >= self.num_chunks {
            return Err(ArrayError::MissingChunk {
                index,
                count: self.num_chunks,
            });
        }
        match &self.kernel {
            Kernel::Source(blocks) => Ok(Arc::clone(&blocks[index])),
            Kernel::Deferred { compute, .. } => evaluation.fetch(TaskKey::new(self.id, index), || {
                compute(evaluation, index).map(Arc::from)
            }),
        }
    }
}

impl<T: Element> GraphNode for Node<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn op(&self) -> &str {
        &self.op
    }

    fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    fn chunk_deps(&self, chunk: usize) -> Vec<TaskKey> {
        match &self.kernel {
            Kernel::Source(_) => Vec::new(),
            Kernel::Deferred { deps, .. } => deps(chunk),
        }
    }

    fn parents(&self) -> Vec<Arc<dyn GraphNode>> {
        match &self.kernel {
            Kernel::Source(_) => Vec::new(),
            Kernel::Deferred { parents, .. } => parents.clone(),
        }
    }
}

/// Read an arbitrary region from a node by stitching its chunks.
pub(crate) fn gather_region<T: Element>(
    node: &Node<T>,
    evaluation: &Evaluation,
    layout: &ChunkLayout,
    origin: &[usize],
    shape: &[usize],
) -> Result<Vec<T>> {
    let mut out = vec![T::default(); shape.iter().product()];
    for chunk in layout.overlapping(origin, shape) {
        let (chunk_origin, chunk_shape) = layout.chunk_region(chunk);
        let block = node.chunk(evaluation, chunk)?;
        copy_overlap(&block, &chunk_origin, &chunk_shape, &mut out, origin, shape);
    }
    Ok(out)
}

/// A labeled N-dimensional array partitioned into rectangular chunks.
///
/// Every transform returns a new array backed by a deferred graph node;
/// nothing is evaluated until [`ChunkedArray::compute`],
/// [`ChunkedArray::compute_blocks`], [`ChunkedArray::try_for_each_chunk`]
/// or [`ChunkedArray::chunk`] is called.
#[derive(Clone)]
pub struct ChunkedArray<T: Element> {
    name: String,
    units: Option<String>,
    axes: Vec<Axis>,
    layout: ChunkLayout,
    node: Arc<Node<T>>,
}

impl<T: Element> ChunkedArray<T> {
    /// Build an array from row-major data, split according to `chunking`.
    ///
    /// Axes not mentioned in `chunking` are kept whole.
    pub fn from_vec(
        name: impl Into<String>,
        axes: Vec<Axis>,
        data: Vec<T>,
        chunking: &[(&str, Chunking)],
    ) -> Result<Self> {
        let shape: Vec<usize> = axes.iter().map(Axis::len).collect();
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ArrayError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut layout = ChunkLayout::whole(shape.clone());
        for (axis_name, chunks) in chunking {
            let axis = axis_position(&axes, axis_name)?;
            layout = layout.with_chunking(axis, *chunks)?;
        }

        let origin = vec![0; shape.len()];
        let blocks = (0..layout.num_chunks())
            .map(|c| {
                let (chunk_origin, chunk_shape) = layout.chunk_region(c);
                let mut block = vec![T::default(); chunk_shape.iter().product()];
                copy_overlap(&data, &origin, &shape, &mut block, &chunk_origin, &chunk_shape);
                Arc::from(block)
            })
            .collect();

        Ok(Self {
            name: name.into(),
            units: None,
            axes,
            layout,
            node: Arc::new(Node::source("from_vec", blocks)),
        })
    }

    /// Build an array from pre-chunked blocks (one per chunk, row-major).
    pub fn from_blocks(
        name: impl Into<String>,
        axes: Vec<Axis>,
        chunk_sizes: Vec<usize>,
        blocks: Vec<Vec<T>>,
    ) -> Result<Self> {
        let shape: Vec<usize> = axes.iter().map(Axis::len).collect();
        let layout = ChunkLayout::new(shape, chunk_sizes)?;
        if blocks.len() != layout.num_chunks() {
            return Err(ArrayError::invalid_chunking(format!(
                "{} blocks for {} chunks",
                blocks.len(),
                layout.num_chunks()
            )));
        }
        for (c, block) in blocks.iter().enumerate() {
            let (_, chunk_shape) = layout.chunk_region(c);
            let expected: usize = chunk_shape.iter().product();
            if block.len() != expected {
                return Err(ArrayError::ShapeMismatch {
                    expected,
                    actual: block.len(),
                });
            }
        }
        let blocks = blocks.into_iter().map(Arc::from).collect();
        Ok(Self {
            name: name.into(),
            units: None,
            axes,
            layout,
            node: Arc::new(Node::source("from_blocks", blocks)),
        })
    }

    /// Build an array whose chunks are produced on demand by `load`.
    ///
    /// `load(c)` returns the row-major block of chunk `c`. Nothing is read
    /// until the array is evaluated, and blocks are not kept afterwards.
    pub fn from_loader<F>(
        name: impl Into<String>,
        axes: Vec<Axis>,
        chunk_sizes: Vec<usize>,
        load: F,
    ) -> Result<Self>
    where
        F: Fn(usize) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        let shape: Vec<usize> = axes.iter().map(Axis::len).collect();
        let layout = ChunkLayout::new(shape, chunk_sizes)?;
        let regions = layout.clone();
        let node = Node::deferred(
            "load",
            layout.num_chunks(),
            Vec::new(),
            Box::new(|_: usize| Vec::<TaskKey>::new()),
            Box::new(move |_: &Evaluation, c| {
                let block = load(c)?;
                let (_, chunk_shape) = regions.chunk_region(c);
                let expected: usize = chunk_shape.iter().product();
                if block.len() != expected {
                    return Err(ArrayError::ShapeMismatch {
                        expected,
                        actual: block.len(),
                    });
                }
                Ok(block)
            }),
        );
        Ok(Self::from_node(name, None, axes, layout, node))
    }

    pub(crate) fn from_node(
        name: impl Into<String>,
        units: Option<String>,
        axes: Vec<Axis>,
        layout: ChunkLayout,
        node: Node<T>,
    ) -> Self {
        Self {
            name: name.into(),
            units,
            axes,
            layout,
            node: Arc::new(node),
        }
    }

    pub(crate) fn node(&self) -> &Arc<Node<T>> {
        &self.node
    }

    pub(crate) fn graph_node(&self) -> Arc<dyn GraphNode> {
        Arc::clone(&self.node) as Arc<dyn GraphNode>
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Units tag, if known.
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// The same array under a different name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The same array with a units tag.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// The same array with the units tag removed.
    pub fn without_units(mut self) -> Self {
        self.units = None;
        self
    }

    /// Axes in storage order.
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Axis names in storage order.
    pub fn axis_names(&self) -> Vec<&str> {
        self.axes.iter().map(Axis::name).collect()
    }

    /// Look up an axis by name.
    pub fn axis(&self, name: &str) -> Result<&Axis> {
        self.axes
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ArrayError::axis_not_found(name))
    }

    /// Position of a named axis.
    pub fn axis_index(&self, name: &str) -> Result<usize> {
        axis_position(&self.axes, name)
    }

    /// Check whether the array has an axis with this name.
    pub fn has_axis(&self, name: &str) -> bool {
        self.axes.iter().any(|a| a.name() == name)
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Chunk layout.
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Check if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Number of chunks.
    pub fn num_chunks(&self) -> usize {
        self.layout.num_chunks()
    }

    /// Rename an axis. Pure label rewrite; data and graph are shared.
    pub fn rename_axis(&self, old: &str, new: &str) -> Result<Self> {
        let index = self.axis_index(old)?;
        let mut renamed = self.clone();
        renamed.axes[index] = self.axes[index].renamed(new);
        Ok(renamed)
    }

    /// Evaluate one chunk.
    pub fn chunk(&self, index: usize) -> Result<Arc<[T]>> {
        let evaluation = Evaluation::new(&self.graph_node(), [index]);
        self.node.chunk(&evaluation, index)
    }

    /// Evaluate all chunks in parallel.
    pub fn compute_blocks(&self) -> Result<Vec<Arc<[T]>>> {
        tracing::debug!(
            name = %self.name,
            chunks = self.num_chunks(),
            "Computing chunked array"
        );
        let evaluation = Evaluation::new(&self.graph_node(), 0..self.num_chunks());
        (0..self.num_chunks())
            .into_par_iter()
            .map(|c| self.node.chunk(&evaluation, c))
            .collect()
    }

    /// Evaluate all chunks in parallel, handing each block to `f` as soon as
    /// it is ready.
    ///
    /// A block is dropped once `f` returns, so only the chunks in flight are
    /// held in memory. The first error stops the remaining chunks.
    pub fn try_for_each_chunk<E, F>(&self, f: F) -> std::result::Result<(), E>
    where
        E: From<ArrayError> + Send,
        F: Fn(usize, &[T]) -> std::result::Result<(), E> + Send + Sync,
    {
        tracing::debug!(
            name = %self.name,
            chunks = self.num_chunks(),
            "Streaming chunked array"
        );
        let evaluation = Evaluation::new(&self.graph_node(), 0..self.num_chunks());
        (0..self.num_chunks()).into_par_iter().try_for_each(|c| {
            let block = self.node.chunk(&evaluation, c)?;
            f(c, &block)
        })
    }

    /// Evaluate the whole array into a row-major vector.
    pub fn compute(&self) -> Result<Vec<T>> {
        let blocks = self.compute_blocks()?;
        let shape = self.layout.shape();
        let origin = vec![0; shape.len()];
        let mut out = vec![T::default(); self.len()];
        for (c, block) in blocks.iter().enumerate() {
            let (chunk_origin, chunk_shape) = self.layout.chunk_region(c);
            copy_overlap(block, &chunk_origin, &chunk_shape, &mut out, &origin, shape);
        }
        Ok(out)
    }

    /// Evaluate and return an array backed by the computed blocks.
    pub fn persist(&self) -> Result<Self> {
        let blocks = self.compute_blocks()?;
        Ok(Self {
            name: self.name.clone(),
            units: self.units.clone(),
            axes: self.axes.clone(),
            layout: self.layout.clone(),
            node: Arc::new(Node::source("persist", blocks)),
        })
    }

    /// The task graph that evaluating this array would run.
    pub fn task_graph(&self) -> TaskGraph {
        TaskGraph::from_root(&self.graph_node())
    }

    /// Graph node id of this array.
    pub fn node_id(&self) -> NodeId {
        self.node.id()
    }

    /// Apply a function to every element.
    pub fn map<U, F>(&self, op: &str, f: F) -> ChunkedArray<U>
    where
        U: Element,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let parent = Arc::clone(&self.node);
        let parent_id = parent.id();
        let node = Node::deferred(
            op,
            self.num_chunks(),
            vec![self.graph_node()],
            Box::new(move |c| vec![TaskKey::new(parent_id, c)]),
            Box::new(move |evaluation: &Evaluation, c| {
                Ok(parent.chunk(evaluation, c)?.iter().map(|&v| f(v)).collect())
            }),
        );
        ChunkedArray::from_node(
            self.name.clone(),
            None,
            self.axes.clone(),
            self.layout.clone(),
            node,
        )
    }

    /// Combine two arrays elementwise.
    ///
    /// Both arrays must have identical axes and coordinates. If only the
    /// chunking differs, `other` is rechunked to match `self`.
    pub fn zip_with<U, V, F>(&self, other: &ChunkedArray<U>, op: &str, f: F) -> Result<ChunkedArray<V>>
    where
        U: Element,
        V: Element,
        F: Fn(T, U) -> V + Send + Sync + 'static,
    {
        ensure_same_axes(&self.axes, &other.axes).map_err(|_| {
            ArrayError::axis_mismatch(
                format!("{}{}", self.name, describe_axes(&self.axes)),
                format!("{}{}", other.name, describe_axes(&other.axes)),
            )
        })?;
        let other = other.rechunk_to(self.layout.chunk_sizes().to_vec())?;

        let left = Arc::clone(&self.node);
        let right = Arc::clone(&other.node);
        let (left_id, right_id) = (left.id(), right.id());
        let node = Node::deferred(
            op,
            self.num_chunks(),
            vec![self.graph_node(), other.graph_node()],
            Box::new(move |c| vec![TaskKey::new(left_id, c), TaskKey::new(right_id, c)]),
            Box::new(move |evaluation: &Evaluation, c| {
                let a = left.chunk(evaluation, c)?;
                let b = right.chunk(evaluation, c)?;
                Ok(a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect())
            }),
        );
        Ok(ChunkedArray::from_node(
            self.name.clone(),
            None,
            self.axes.clone(),
            self.layout.clone(),
            node,
        ))
    }

    /// Repartition one or more axes.
    pub fn rechunk(&self, chunking: &[(&str, Chunking)]) -> Result<Self> {
        let mut layout = self.layout.clone();
        for (axis_name, chunks) in chunking {
            let axis = self.axis_index(axis_name)?;
            layout = layout.with_chunking(axis, *chunks)?;
        }
        self.rechunk_to(layout.chunk_sizes().to_vec())
    }

    /// Repartition to explicit chunk sizes. Returns `self` when unchanged.
    pub(crate) fn rechunk_to(&self, chunk_sizes: Vec<usize>) -> Result<Self> {
        let layout = ChunkLayout::new(self.layout.shape().to_vec(), chunk_sizes)?;
        if layout == self.layout {
            return Ok(self.clone());
        }

        let parent = Arc::clone(&self.node);
        let parent_id = parent.id();
        let old = self.layout.clone();
        let new = layout.clone();
        let deps_old = old.clone();
        let deps_new = new.clone();
        let node = Node::deferred(
            "rechunk",
            layout.num_chunks(),
            vec![self.graph_node()],
            Box::new(move |c| {
                let (origin, shape) = deps_new.chunk_region(c);
                deps_old
                    .overlapping(&origin, &shape)
                    .into_iter()
                    .map(|p| TaskKey::new(parent_id, p))
                    .collect()
            }),
            Box::new(move |evaluation: &Evaluation, c| {
                let (origin, shape) = new.chunk_region(c);
                gather_region(&parent, evaluation, &old, &origin, &shape)
            }),
        );
        Ok(Self::from_node(
            self.name.clone(),
            self.units.clone(),
            self.axes.clone(),
            layout,
            node,
        ))
    }

    /// Select an index range along one axis.
    pub fn isel(&self, axis: &str, range: std::ops::Range<usize>) -> Result<Self> {
        let index = self.axis_index(axis)?;
        let len = self.axes[index].len();
        if range.start >= range.end || range.end > len {
            return Err(ArrayError::EmptySelection(format!(
                "{}[{}..{}] of {}",
                axis, range.start, range.end, len
            )));
        }

        let mut axes = self.axes.clone();
        axes[index] = Axis::new(axis, self.axes[index].coord().slice(range.clone()));
        let mut shape = self.layout.shape().to_vec();
        shape[index] = range.len();
        let layout = ChunkLayout::new(shape, self.layout.chunk_sizes().to_vec())?;

        let parent = Arc::clone(&self.node);
        let parent_id = parent.id();
        let old = self.layout.clone();
        let new = layout.clone();
        let deps_old = old.clone();
        let deps_new = new.clone();
        let offset = range.start;
        let shift = move |mut origin: Vec<usize>| {
            origin[index] += offset;
            origin
        };
        let node = Node::deferred(
            "isel",
            layout.num_chunks(),
            vec![self.graph_node()],
            Box::new(move |c| {
                let (origin, shape) = deps_new.chunk_region(c);
                deps_old
                    .overlapping(&shift(origin), &shape)
                    .into_iter()
                    .map(|p| TaskKey::new(parent_id, p))
                    .collect()
            }),
            Box::new(move |evaluation: &Evaluation, c| {
                let (origin, shape) = new.chunk_region(c);
                let mut origin = origin;
                origin[index] += offset;
                gather_region(&parent, evaluation, &old, &origin, &shape)
            }),
        );
        Ok(Self::from_node(
            self.name.clone(),
            self.units.clone(),
            axes,
            layout,
            node,
        ))
    }

    /// Select dates in `[start, end]` (inclusive) along a time axis.
    pub fn sel_dates(&self, axis: &str, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let range = self.axis(axis)?.date_range(start, end)?;
        if range.is_empty() {
            return Err(ArrayError::EmptySelection(format!(
                "no {} labels between {} and {}",
                axis, start, end
            )));
        }
        self.isel(axis, range)
    }
}

impl<T: Element> fmt::Debug for ChunkedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedArray")
            .field("name", &self.name)
            .field("units", &self.units)
            .field("axes", &describe_axes(&self.axes))
            .field("chunks", &self.layout.chunk_sizes())
            .field("node", &self.node.id())
            .finish()
    }
}

pub(crate) fn axis_position(axes: &[Axis], name: &str) -> Result<usize> {
    axes.iter()
        .position(|a| a.name() == name)
        .ok_or_else(|| ArrayError::axis_not_found(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize) -> ChunkedArray<Value> {
        let data = (0..rows * cols).map(|i| Some(i as f64)).collect();
        ChunkedArray::from_vec(
            "grid",
            vec![
                Axis::values("latitude", (0..rows).map(|r| r as f64).collect()),
                Axis::values("longitude", (0..cols).map(|c| c as f64).collect()),
            ],
            data,
            &[("latitude", Chunking::Size(2)), ("longitude", Chunking::Size(3))],
        )
        .unwrap()
    }

    #[test]
    fn test_from_vec_shape_mismatch() {
        let result = ChunkedArray::from_vec(
            "bad",
            vec![Axis::values("x", vec![0.0, 1.0])],
            vec![Some(1.0)],
            &[],
        );
        assert_eq!(
            result.unwrap_err(),
            ArrayError::ShapeMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_compute_reassembles_chunks() {
        let array = grid(5, 7);
        assert_eq!(array.num_chunks(), 9);
        let values = array.compute().unwrap();
        let expected: Vec<Value> = (0..35).map(|i| Some(i as f64)).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_rename_axis() {
        let array = grid(2, 2);
        let renamed = array.rename_axis("latitude", "lat").unwrap();
        assert_eq!(renamed.axis_names(), vec!["lat", "longitude"]);
        assert_eq!(renamed.node_id(), array.node_id());
        assert_eq!(
            array.rename_axis("valid_time", "time").unwrap_err(),
            ArrayError::AxisNotFound("valid_time".to_string())
        );
    }

    #[test]
    fn test_rechunk_preserves_values() {
        let array = grid(5, 7);
        let rechunked = array
            .rechunk(&[("latitude", Chunking::Whole), ("longitude", Chunking::Size(2))])
            .unwrap();
        assert_eq!(rechunked.layout().chunk_sizes(), &[5, 2]);
        assert_eq!(rechunked.compute().unwrap(), array.compute().unwrap());
    }

    #[test]
    fn test_rechunk_whole_axis_is_a_gather_barrier() {
        let array = grid(6, 3);
        let rechunked = array.rechunk(&[("latitude", Chunking::Whole)]).unwrap();
        let graph = rechunked.task_graph();
        let tasks = graph.node_tasks(rechunked.node_id());
        assert_eq!(tasks.len(), 1);
        // The single output chunk reads all three latitude chunks.
        assert_eq!(tasks[0].deps.len(), 3);
        assert_eq!(graph.sources().len(), 3);
    }

    #[test]
    fn test_rechunk_same_layout_is_noop() {
        let array = grid(4, 4);
        let same = array.rechunk(&[("latitude", Chunking::Size(2))]).unwrap();
        assert_eq!(same.node_id(), array.node_id());
    }

    #[test]
    fn test_map_and_zip() {
        let a = grid(3, 4);
        let doubled = a.map("double", |v: Value| v.map(|x| x * 2.0));
        let sum = a
            .zip_with(&doubled, "add", |x: Value, y: Value| match (x, y) {
                (Some(x), Some(y)) => Some(x + y),
                _ => None,
            })
            .unwrap();
        let values = sum.compute().unwrap();
        assert_eq!(values[5], Some(15.0));
    }

    #[test]
    fn test_zip_rechunks_right_operand() {
        let a = grid(4, 6);
        let b = a.rechunk(&[("longitude", Chunking::Whole)]).unwrap();
        let eq = a.zip_with(&b, "eq", |x: Value, y: Value| x == y).unwrap();
        assert_eq!(eq.layout(), a.layout());
        assert!(eq.compute().unwrap().into_iter().all(|e| e));
    }

    #[test]
    fn test_zip_axis_mismatch() {
        let a = grid(3, 3);
        let b = grid(3, 4);
        let result = a.zip_with(&b, "add", |x: Value, _y: Value| x);
        assert!(matches!(result, Err(ArrayError::AxisMismatch { .. })));
    }

    #[test]
    fn test_isel_across_chunk_boundary() {
        let array = grid(6, 2);
        let sliced = array.isel("latitude", 1..4).unwrap();
        assert_eq!(sliced.shape(), &[3, 2]);
        let values = sliced.compute().unwrap();
        assert_eq!(values, (2..8).map(|i| Some(i as f64)).collect::<Vec<_>>());
        assert!(array.isel("latitude", 4..4).is_err());
    }

    #[test]
    fn test_sel_dates_inclusive() {
        let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..10).map(|d| start + chrono::Duration::days(d)).collect();
        let array = ChunkedArray::from_vec(
            "t",
            vec![Axis::time("time", dates)],
            (0..10).map(|i| i as i64).collect(),
            &[("time", Chunking::Size(4))],
        )
        .unwrap();
        let sel = array
            .sel_dates(
                "time",
                NaiveDate::from_ymd_opt(2000, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2000, 1, 6).unwrap(),
            )
            .unwrap();
        assert_eq!(sel.compute().unwrap(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_shared_parent_evaluated_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let base = grid(2, 2).map("count", move |v: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            v
        });
        let left = base.map("left", |v: Value| v);
        let right = base.map("right", |v: Value| v);
        let both = left.zip_with(&right, "eq", |a: Value, b: Value| a == b).unwrap();
        both.compute().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_from_loader_reads_on_demand() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let array = ChunkedArray::from_loader(
            "t2m",
            vec![Axis::values("latitude", (0..5).map(|r| r as f64).collect())],
            vec![2],
            move |c| {
                counter.fetch_add(1, Ordering::SeqCst);
                let start = c * 2;
                Ok((start..(start + 2).min(5)).map(|i| Some(i as f64)).collect())
            },
        )
        .unwrap();
        let doubled = array.map("double", |v: Value| v.map(|x| x * 2.0));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(doubled.task_graph().sources().len(), 3);

        assert_eq!(doubled.chunk(1).unwrap().to_vec(), vec![Some(4.0), Some(6.0)]);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let values = doubled.compute().unwrap();
        assert_eq!(values[4], Some(8.0));
        assert_eq!(loads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_from_loader_checks_block_length() {
        let array = ChunkedArray::from_loader(
            "bad",
            vec![Axis::values("latitude", vec![0.0, 1.0, 2.0])],
            vec![3],
            |_| Ok(vec![Some(1.0)]),
        )
        .unwrap();
        assert_eq!(
            array.compute().unwrap_err(),
            ArrayError::ShapeMismatch {
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn test_try_for_each_chunk_visits_every_block() {
        use std::sync::Mutex;

        let array = grid(5, 7);
        let seen = Mutex::new(Vec::new());
        array
            .try_for_each_chunk(|c, block: &[Value]| -> Result<()> {
                seen.lock().unwrap().push((c, block.len()));
                Ok(())
            })
            .unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen.len(), 9);
        assert_eq!(seen[0], (0, 6));
        assert_eq!(seen[8], (8, 1));
    }

    #[test]
    fn test_try_for_each_chunk_propagates_errors() {
        let array = grid(4, 4);
        let result = array.try_for_each_chunk(|c, _block: &[Value]| {
            if c == 2 {
                Err(ArrayError::MissingChunk { index: c, count: 0 })
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(ArrayError::MissingChunk { index: 2, .. })));
    }
}
