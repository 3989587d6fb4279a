//! Explicit task graph of per-chunk transforms.
//!
//! Every chunked array is backed by a node. A node produces one task per
//! output chunk, and each task lists the parent chunks it reads. The graph
//! is only a description; evaluation happens in [`crate::ChunkedArray::compute`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier of a graph node.
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// One output chunk of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    pub node: NodeId,
    pub chunk: usize,
}

impl TaskKey {
    pub fn new(node: NodeId, chunk: usize) -> Self {
        Self { node, chunk }
    }
}

/// A pure per-chunk transform and the chunks it depends on.
#[derive(Debug, Clone)]
pub struct Task {
    pub key: TaskKey,
    pub op: String,
    pub deps: Vec<TaskKey>,
}

/// Type-erased view of a node, used to walk the graph.
pub trait GraphNode: Send + Sync {
    fn id(&self) -> NodeId;
    fn op(&self) -> &str;
    fn num_chunks(&self) -> usize;
    fn chunk_deps(&self, chunk: usize) -> Vec<TaskKey>;
    fn parents(&self) -> Vec<Arc<dyn GraphNode>>;
}

/// The full set of tasks reachable from one array.
#[derive(Debug, Default, Clone)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskKey, Task>,
    ops: BTreeMap<NodeId, String>,
}

impl TaskGraph {
    /// Build the graph reachable from `root`.
    pub fn from_root(root: &Arc<dyn GraphNode>) -> Self {
        let mut graph = Self::default();
        let mut visited = BTreeSet::new();
        let mut stack = vec![Arc::clone(root)];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.id()) {
                continue;
            }
            graph.ops.insert(node.id(), node.op().to_string());
            for chunk in 0..node.num_chunks() {
                let key = TaskKey::new(node.id(), chunk);
                graph.tasks.insert(
                    key,
                    Task {
                        key,
                        op: node.op().to_string(),
                        deps: node.chunk_deps(chunk),
                    },
                );
            }
            stack.extend(node.parents());
        }
        graph
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.ops.len()
    }

    /// Look up a task.
    pub fn task(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.get(key)
    }

    /// All tasks in key order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Tasks belonging to one node.
    pub fn node_tasks(&self, node: NodeId) -> Vec<&Task> {
        self.tasks
            .range(TaskKey::new(node, 0)..TaskKey::new(node, usize::MAX))
            .map(|(_, t)| t)
            .collect()
    }

    /// Operation name of a node.
    pub fn op(&self, node: NodeId) -> Option<&str> {
        self.ops.get(&node).map(String::as_str)
    }

    /// Node ids whose operation name starts with `prefix`.
    pub fn nodes_with_op(&self, prefix: &str) -> Vec<NodeId> {
        self.ops
            .iter()
            .filter(|(_, op)| op.starts_with(prefix))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Tasks without dependencies (load boundary).
    pub fn sources(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.deps.is_empty()).collect()
    }

    /// Longest dependency chain, counted in tasks.
    pub fn depth(&self) -> usize {
        let mut memo: BTreeMap<TaskKey, usize> = BTreeMap::new();
        self.tasks
            .keys()
            .map(|key| self.depth_of(*key, &mut memo))
            .max()
            .unwrap_or(0)
    }

    fn depth_of(&self, key: TaskKey, memo: &mut BTreeMap<TaskKey, usize>) -> usize {
        if let Some(&d) = memo.get(&key) {
            return d;
        }
        let deps = self.tasks.get(&key).map(|t| t.deps.clone()).unwrap_or_default();
        let d = 1 + deps
            .into_iter()
            .map(|dep| self.depth_of(dep, memo))
            .max()
            .unwrap_or(0);
        memo.insert(key, d);
        d
    }
}
