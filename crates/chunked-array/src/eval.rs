//! Evaluation-scoped block cache.
//!
//! An [`Evaluation`] covers one call into the execution stage. Before any
//! chunk runs it walks the tasks needed for the requested output chunks and
//! counts how many tasks read each one. A block with a single reader is
//! handed straight to it; a block with several readers is cached until the
//! last of them has fetched it, then dropped. Nothing outlives the
//! evaluation, so peak memory follows the blocks in flight rather than the
//! size of the graph.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{ArrayError, Result};
use crate::graph::{GraphNode, NodeId, TaskKey};

type Block = Arc<dyn Any + Send + Sync>;
type Slot = Arc<OnceLock<Result<Block>>>;

struct Entry {
    slot: Slot,
    remaining: usize,
}

/// Reader counts and shared blocks for one evaluation.
pub(crate) struct Evaluation {
    readers: HashMap<TaskKey, usize>,
    cached: Mutex<HashMap<TaskKey, Entry>>,
}

impl Evaluation {
    /// Plan the evaluation of `chunks` of `root`.
    pub(crate) fn new(root: &Arc<dyn GraphNode>, chunks: impl IntoIterator<Item = usize>) -> Self {
        let mut nodes: HashMap<NodeId, Arc<dyn GraphNode>> = HashMap::new();
        let mut pending = vec![Arc::clone(root)];
        while let Some(node) = pending.pop() {
            if nodes.contains_key(&node.id()) {
                continue;
            }
            pending.extend(node.parents());
            nodes.insert(node.id(), node);
        }

        // Each task runs once, so its reads are counted once.
        let mut readers: HashMap<TaskKey, usize> = HashMap::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<TaskKey> = chunks
            .into_iter()
            .map(|c| TaskKey::new(root.id(), c))
            .collect();
        while let Some(key) = stack.pop() {
            if !visited.insert(key) {
                continue;
            }
            let Some(node) = nodes.get(&key.node) else {
                continue;
            };
            for dep in node.chunk_deps(key.chunk) {
                *readers.entry(dep).or_default() += 1;
                stack.push(dep);
            }
        }

        Self {
            readers,
            cached: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tasks that read `key` in this evaluation.
    pub(crate) fn readers(&self, key: &TaskKey) -> usize {
        self.readers.get(key).copied().unwrap_or(0)
    }

    /// Block of `key`, computed with `compute` unless another reader already
    /// did so.
    pub(crate) fn fetch<T>(
        &self,
        key: TaskKey,
        compute: impl FnOnce() -> Result<Arc<[T]>>,
    ) -> Result<Arc<[T]>>
    where
        T: Send + Sync + 'static,
    {
        let readers = self.readers(&key);
        if readers <= 1 {
            return compute();
        }

        let slot = {
            let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = cached.entry(key).or_insert_with(|| Entry {
                slot: Arc::new(OnceLock::new()),
                remaining: readers,
            });
            entry.remaining = entry.remaining.saturating_sub(1);
            let slot = Arc::clone(&entry.slot);
            if entry.remaining == 0 {
                cached.remove(&key);
            }
            slot
        };

        let block = slot
            .get_or_init(|| compute().map(|block| Arc::new(block) as Block))
            .clone()?;
        block.downcast_ref::<Arc<[T]>>().cloned().ok_or_else(|| {
            ArrayError::Evaluation(format!(
                "block of node {} chunk {} has an unexpected element type",
                key.node, key.chunk
            ))
        })
    }

    /// Blocks currently held for readers that have not fetched them yet.
    #[cfg(test)]
    pub(crate) fn cached_blocks(&self) -> usize {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::array::{ChunkedArray, Value};
    use crate::axis::Axis;
    use crate::layout::Chunking;

    fn counted(calls: &Arc<AtomicUsize>) -> ChunkedArray<Value> {
        let counter = Arc::clone(calls);
        ChunkedArray::from_vec(
            "x",
            vec![Axis::values("latitude", vec![0.0, 1.0, 2.0, 3.0])],
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)],
            &[("latitude", Chunking::Size(2))],
        )
        .unwrap()
        .map("count", move |v: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            v
        })
    }

    #[test]
    fn test_reader_counts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = counted(&calls);
        let left = base.map("left", |v: Value| v);
        let sum = left
            .zip_with(&base, "add", |a: Value, b: Value| a.zip(b).map(|(a, b)| a + b))
            .unwrap();

        let evaluation = Evaluation::new(&sum.graph_node(), 0..sum.num_chunks());
        // `base` is read by `left` and by `sum`; `left` only by `sum`.
        assert_eq!(evaluation.readers(&TaskKey::new(base.node_id(), 0)), 2);
        assert_eq!(evaluation.readers(&TaskKey::new(left.node_id(), 1)), 1);
        assert_eq!(evaluation.readers(&TaskKey::new(sum.node_id(), 0)), 0);
    }

    #[test]
    fn test_only_requested_chunks_are_planned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = counted(&calls);
        let doubled = base.map("double", |v: Value| v.map(|x| x * 2.0));
        let evaluation = Evaluation::new(&doubled.graph_node(), [1]);
        assert_eq!(evaluation.readers(&TaskKey::new(base.node_id(), 0)), 0);
        assert_eq!(evaluation.readers(&TaskKey::new(base.node_id(), 1)), 1);
    }

    #[test]
    fn test_shared_block_released_after_last_reader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = counted(&calls);
        let left = base.map("left", |v: Value| v);
        let right = base.map("right", |v: Value| v);
        let both = left.zip_with(&right, "eq", |a: Value, b: Value| a == b).unwrap();

        let evaluation = Evaluation::new(&both.graph_node(), [0]);
        let first = base.node().chunk(&evaluation, 0).unwrap();
        assert_eq!(evaluation.cached_blocks(), 1);
        let second = base.node().chunk(&evaluation, 0).unwrap();
        assert_eq!(evaluation.cached_blocks(), 0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nothing_retained_between_evaluations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = counted(&calls);
        base.compute().unwrap();
        base.compute().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }
}
