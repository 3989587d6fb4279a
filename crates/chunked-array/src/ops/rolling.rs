//! Centered rolling windows materialized as an extra axis.

use std::sync::Arc;

use crate::array::{gather_region, ChunkedArray, Element, Node};
use crate::axis::{Axis, Coord};
use crate::error::{ArrayError, Result};
use crate::eval::Evaluation;
use crate::graph::TaskKey;
use crate::layout::{for_each_index, strides, ChunkLayout};

impl<T: Element> ChunkedArray<Option<T>> {
    /// Add a trailing window axis holding the `width` values centered on each
    /// position of `axis`.
    ///
    /// The window axis is labeled with the offsets from the center (for a
    /// width of 5: -2..=2). Positions whose window would run past either end
    /// of `axis` get a window of missing values. Chunks read a halo from
    /// their neighbours along `axis`, so the input does not need rechunking.
    pub fn rolling_construct(&self, axis: &str, width: usize, window_axis: &str) -> Result<Self> {
        if width == 0 {
            return Err(ArrayError::invalid_chunking("rolling window width must be > 0"));
        }
        if self.has_axis(window_axis) {
            return Err(ArrayError::invalid_coordinate(format!(
                "window axis '{}' already exists",
                window_axis
            )));
        }
        let a = self.axis_index(axis)?;
        let n = self.shape()[a];
        let left = width / 2;
        let right = width - 1 - left;
        let ndim = self.shape().len();

        let offsets: Vec<i64> = (0..width as i64).map(|k| k - left as i64).collect();
        let mut axes = self.axes().to_vec();
        axes.push(Axis::new(window_axis, Coord::Index(offsets)));

        let mut shape = self.shape().to_vec();
        shape.push(width);
        let mut chunk_sizes = self.layout().chunk_sizes().to_vec();
        chunk_sizes.push(width);
        let layout = ChunkLayout::new(shape, chunk_sizes)?;

        // Input region needed by an output chunk: the chunk itself plus the
        // halo along `axis`, clipped to the array bounds.
        let halo = move |mut origin: Vec<usize>, mut shape: Vec<usize>| {
            origin.truncate(ndim);
            shape.truncate(ndim);
            let lo = origin[a].saturating_sub(left);
            let hi = (origin[a] + shape[a] + right).min(n);
            origin[a] = lo;
            shape[a] = hi - lo;
            (origin, shape)
        };

        let parent = Arc::clone(self.node());
        let parent_id = parent.id();
        let old = self.layout().clone();
        let new = layout.clone();
        let deps_old = old.clone();
        let deps_new = new.clone();

        let node = Node::deferred(
            format!("rolling-{}", width),
            layout.num_chunks(),
            vec![self.graph_node()],
            Box::new(move |c| {
                let (origin, shape) = deps_new.chunk_region(c);
                let (origin, shape) = halo(origin, shape);
                deps_old
                    .overlapping(&origin, &shape)
                    .into_iter()
                    .map(|p| TaskKey::new(parent_id, p))
                    .collect()
            }),
            Box::new(move |evaluation: &Evaluation, c| {
                let (out_origin, out_shape) = new.chunk_region(c);
                let (in_origin, in_shape) = halo(out_origin.clone(), out_shape.clone());
                let region = gather_region(&parent, evaluation, &old, &in_origin, &in_shape)?;
                let in_strides = strides(&in_shape);

                let mut out = Vec::with_capacity(out_shape.iter().product());
                for_each_index(&out_shape, |idx| {
                    let center = out_origin[a] + idx[a];
                    if center < left || center + right >= n {
                        out.push(None);
                        return;
                    }
                    let t = center - left + idx[ndim];
                    let mut offset = 0;
                    for axis in 0..ndim {
                        let i = if axis == a {
                            t - in_origin[a]
                        } else {
                            idx[axis]
                        };
                        offset += i * in_strides[axis];
                    }
                    out.push(region[offset]);
                });
                Ok(out)
            }),
        );

        Ok(Self::from_node(
            self.name(),
            self.units().map(str::to_string),
            axes,
            layout,
            node,
        ))
    }
}
