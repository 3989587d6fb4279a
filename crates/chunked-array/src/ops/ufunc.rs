//! Vectorized application of a 1-D kernel over core dimensions.

use std::sync::Arc;

use crate::array::{ChunkedArray, Element, Node};
use crate::axis::Axis;
use crate::error::{ArrayError, Result};
use crate::eval::Evaluation;
use crate::graph::TaskKey;
use crate::layout::{for_each_index, strides, ChunkLayout};

/// Description of one kernel output.
#[derive(Debug, Clone)]
pub struct UfuncOutput {
    pub name: String,
    pub core_axes: Vec<Axis>,
}

impl UfuncOutput {
    /// A scalar output (one value per loop cell).
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core_axes: Vec::new(),
        }
    }

    /// An output with its own core axes.
    pub fn with_core(name: impl Into<String>, core_axes: Vec<Axis>) -> Self {
        Self {
            name: name.into(),
            core_axes,
        }
    }

    fn core_len(&self) -> usize {
        self.core_axes.iter().map(Axis::len).product()
    }
}

impl<T: Element> ChunkedArray<T> {
    /// Apply `f` to the values along `core_dims` at every position of the
    /// remaining (loop) axes.
    ///
    /// The slice handed to `f` is row-major over `core_dims` in the order
    /// given. `f` returns one vector per entry of `outputs`, each holding the
    /// row-major values of that output's core axes. Output arrays have the
    /// loop axes (in input order, with input chunking) followed by their core
    /// axes.
    ///
    /// Every core dimension must be a single chunk; otherwise this fails with
    /// [`ArrayError::CoreDimensionChunked`].
    pub fn apply_ufunc<U, F>(
        &self,
        op: &str,
        core_dims: &[&str],
        outputs: Vec<UfuncOutput>,
        f: F,
    ) -> Result<Vec<ChunkedArray<U>>>
    where
        U: Element,
        F: Fn(&[T]) -> Vec<Vec<U>> + Send + Sync + 'static,
    {
        let core: Vec<usize> = core_dims
            .iter()
            .map(|name| self.axis_index(name))
            .collect::<Result<_>>()?;
        for (&c, name) in core.iter().zip(core_dims) {
            let chunks = self.layout().chunks_along(c);
            if chunks > 1 {
                return Err(ArrayError::CoreDimensionChunked {
                    axis: name.to_string(),
                    chunks,
                });
            }
        }

        let ndim = self.axes().len();
        let loop_axes: Vec<usize> = (0..ndim).filter(|i| !core.contains(i)).collect();
        let core_lens: Arc<Vec<usize>> = Arc::new(outputs.iter().map(UfuncOutput::core_len).collect());

        let parent = Arc::clone(self.node());
        let parent_id = parent.id();
        let in_layout = self.layout().clone();
        let kernel_loop = loop_axes.clone();
        let kernel_core = core.clone();
        let kernel_lens = Arc::clone(&core_lens);

        // One task per input chunk computes every output; the concatenated
        // blocks are split by the per-output views below.
        let combined = Arc::new(Node::deferred(
            op,
            self.num_chunks(),
            vec![self.graph_node()],
            Box::new(move |c| vec![TaskKey::new(parent_id, c)]),
            Box::new(move |evaluation: &Evaluation, c| {
                let (_, shape) = in_layout.chunk_region(c);
                let block = parent.chunk(evaluation, c)?;
                let block_strides = strides(&shape);
                let loop_shape: Vec<usize> = kernel_loop.iter().map(|&i| shape[i]).collect();
                let core_shape: Vec<usize> = kernel_core.iter().map(|&i| shape[i]).collect();

                let mut core_offsets = Vec::with_capacity(core_shape.iter().product());
                for_each_index(&core_shape, |idx| {
                    core_offsets.push(
                        idx.iter()
                            .zip(&kernel_core)
                            .map(|(&i, &axis)| i * block_strides[axis])
                            .sum::<usize>(),
                    );
                });

                let cells: usize = loop_shape.iter().product();
                let mut buffers: Vec<Vec<U>> = kernel_lens
                    .iter()
                    .map(|&len| Vec::with_capacity(cells * len))
                    .collect();
                let mut slice = Vec::with_capacity(core_offsets.len());
                let mut failure = None;

                let visit = |idx: &[usize]| {
                    if failure.is_some() {
                        return;
                    }
                    let base: usize = idx
                        .iter()
                        .zip(&kernel_loop)
                        .map(|(&i, &axis)| i * block_strides[axis])
                        .sum();
                    slice.clear();
                    slice.extend(core_offsets.iter().map(|&off| block[base + off]));
                    let results = f(&slice);
                    if results.len() != kernel_lens.len() {
                        failure = Some(ArrayError::KernelOutput {
                            index: 0,
                            expected: kernel_lens.len(),
                            actual: results.len(),
                        });
                        return;
                    }
                    for (o, values) in results.into_iter().enumerate() {
                        if values.len() != kernel_lens[o] {
                            failure = Some(ArrayError::KernelOutput {
                                index: o,
                                expected: kernel_lens[o],
                                actual: values.len(),
                            });
                            return;
                        }
                        buffers[o].extend(values);
                    }
                };
                for_each_index(&loop_shape, visit);
                if let Some(err) = failure {
                    return Err(err);
                }
                Ok(buffers.into_iter().flatten().collect())
            }),
        ));

        let mut arrays = Vec::with_capacity(outputs.len());
        for (o, output) in outputs.into_iter().enumerate() {
            let mut axes: Vec<Axis> = loop_axes.iter().map(|&i| self.axes()[i].clone()).collect();
            let mut chunk_sizes: Vec<usize> = loop_axes
                .iter()
                .map(|&i| self.layout().chunk_sizes()[i])
                .collect();
            for axis in &output.core_axes {
                chunk_sizes.push(axis.len().max(1));
            }
            axes.extend(output.core_axes.iter().cloned());
            let shape: Vec<usize> = axes.iter().map(Axis::len).collect();
            let layout = ChunkLayout::new(shape, chunk_sizes)?;

            let source = Arc::clone(&combined);
            let source_id = source.id();
            let in_layout = self.layout().clone();
            let out_layout = layout.clone();
            let loop_map = loop_axes.clone();
            let lens = Arc::clone(&core_lens);

            let input_chunk = move |out_layout: &ChunkLayout, in_layout: &ChunkLayout, loop_map: &[usize], c: usize| {
                let coords = out_layout.chunk_coords(c);
                let mut in_coords = vec![0; in_layout.ndim()];
                for (k, &i) in loop_map.iter().enumerate() {
                    in_coords[i] = coords[k];
                }
                in_layout.chunk_index(&in_coords)
            };
            let deps_out = out_layout.clone();
            let deps_in = in_layout.clone();
            let deps_map = loop_map.clone();

            let node = Node::deferred(
                format!("{}[{}]", op, output.name),
                layout.num_chunks(),
                vec![Arc::clone(&combined) as Arc<dyn crate::graph::GraphNode>],
                Box::new(move |c| {
                    vec![TaskKey::new(
                        source_id,
                        input_chunk(&deps_out, &deps_in, &deps_map, c),
                    )]
                }),
                Box::new(move |evaluation: &Evaluation, c| {
                    let input = input_chunk(&out_layout, &in_layout, &loop_map, c);
                    let (_, in_shape) = in_layout.chunk_region(input);
                    let cells: usize = loop_map.iter().map(|&i| in_shape[i]).product();
                    let start: usize = lens[..o].iter().map(|len| len * cells).sum();
                    let end = start + lens[o] * cells;
                    let block = source.chunk(evaluation, input)?;
                    Ok(block[start..end].to_vec())
                }),
            );
            arrays.push(ChunkedArray::from_node(output.name, None, axes, layout, node));
        }
        Ok(arrays)
    }
}

#[cfg(test)]
mod tests {
    use crate::array::Value;
    use crate::axis::Coord;
    use crate::layout::Chunking;

    use super::*;

    fn cube() -> ChunkedArray<Value> {
        // year x latitude x longitude, value = year index * 10 + cell
        let data = (0..4 * 2 * 3)
            .map(|i| Some(((i / 6) * 10 + i % 6) as f64))
            .collect();
        ChunkedArray::from_vec(
            "cube",
            vec![
                Axis::years("year", vec![2000, 2001, 2002, 2003]),
                Axis::values("latitude", vec![0.0, 1.0]),
                Axis::values("longitude", vec![0.0, 1.0, 2.0]),
            ],
            data,
            &[("latitude", Chunking::Size(1)), ("longitude", Chunking::Size(2))],
        )
        .unwrap()
    }

    #[test]
    fn test_scalar_outputs_per_cell() {
        let outputs = cube()
            .apply_ufunc(
                "first-last",
                &["year"],
                vec![UfuncOutput::scalar("first"), UfuncOutput::scalar("last")],
                |series: &[Value]| vec![vec![series[0]], vec![series[series.len() - 1]]],
            )
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].name(), "first");
        assert_eq!(outputs[0].axis_names(), vec!["latitude", "longitude"]);
        assert_eq!(
            outputs[0].compute().unwrap(),
            (0..6).map(|c| Some(c as f64)).collect::<Vec<_>>()
        );
        assert_eq!(
            outputs[1].compute().unwrap(),
            (0..6).map(|c| Some(30.0 + c as f64)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_core_output_axis() {
        let outputs = cube()
            .apply_ufunc(
                "diff",
                &["year"],
                vec![UfuncOutput::with_core(
                    "diff",
                    vec![Axis::new("step", Coord::Index(vec![0, 1, 2]))],
                )],
                |series: &[Value]| {
                    vec![series
                        .windows(2)
                        .map(|w| Some(w[1].unwrap_or(0.0) - w[0].unwrap_or(0.0)))
                        .collect()]
                },
            )
            .unwrap();
        let diff = &outputs[0];
        assert_eq!(diff.axis_names(), vec!["latitude", "longitude", "step"]);
        assert!(diff.compute().unwrap().into_iter().all(|d| d == Some(10.0)));
    }

    #[test]
    fn test_chunked_core_dimension_rejected() {
        let chunked = cube().rechunk(&[("year", Chunking::Size(2))]).unwrap();
        let result = chunked.apply_ufunc(
            "noop",
            &["year"],
            vec![UfuncOutput::scalar("x")],
            |series: &[Value]| vec![vec![series[0]]],
        );
        assert!(matches!(
            result,
            Err(ArrayError::CoreDimensionChunked { chunks: 2, .. })
        ));
    }

    #[test]
    fn test_kernel_output_length_checked() {
        let outputs = cube()
            .apply_ufunc(
                "bad",
                &["year"],
                vec![UfuncOutput::scalar("x")],
                |_series: &[Value]| -> Vec<Vec<Value>> { vec![vec![None, None]] },
            )
            .unwrap();
        assert!(matches!(
            outputs[0].compute(),
            Err(ArrayError::KernelOutput { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn test_one_task_per_input_chunk() {
        let array = cube();
        let outputs = array
            .apply_ufunc(
                "first",
                &["year"],
                vec![UfuncOutput::scalar("first")],
                |series: &[Value]| vec![vec![series[0]]],
            )
            .unwrap();
        let graph = outputs[0].task_graph();
        let combined = graph.nodes_with_op("first");
        // the combined kernel node plus the per-output view
        assert_eq!(combined.len(), 2);
        assert_eq!(outputs[0].num_chunks(), array.num_chunks());
    }
}
