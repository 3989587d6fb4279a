//! Rectangular chunk layout arithmetic.
//!
//! All blocks are stored row-major over their own shape. Chunk indices are
//! row-major over the chunk grid.

use crate::error::{ArrayError, Result};

/// Requested chunk size along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunking {
    /// The whole axis in a single chunk.
    Whole,
    /// Fixed chunk length (the last chunk may be shorter).
    Size(usize),
}

/// Shape of an array and the chunk length along each axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    shape: Vec<usize>,
    chunks: Vec<usize>,
}

impl ChunkLayout {
    /// Create a layout from shape and chunk lengths.
    pub fn new(shape: Vec<usize>, chunks: Vec<usize>) -> Result<Self> {
        if shape.len() != chunks.len() {
            return Err(ArrayError::invalid_chunking(format!(
                "{} chunk sizes for {} axes",
                chunks.len(),
                shape.len()
            )));
        }
        if chunks.iter().any(|&c| c == 0) {
            return Err(ArrayError::invalid_chunking("chunk size must be > 0"));
        }
        let chunks = shape
            .iter()
            .zip(&chunks)
            .map(|(&s, &c)| c.min(s.max(1)))
            .collect();
        Ok(Self { shape, chunks })
    }

    /// Layout with every axis in a single chunk.
    pub fn whole(shape: Vec<usize>) -> Self {
        let chunks = shape.iter().map(|&s| s.max(1)).collect();
        Self { shape, chunks }
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Chunk length along each axis.
    pub fn chunk_sizes(&self) -> &[usize] {
        &self.chunks
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks along each axis.
    pub fn grid(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunks)
            .map(|(&s, &c)| (s + c - 1) / c)
            .collect()
    }

    /// Number of chunks along one axis.
    pub fn chunks_along(&self, axis: usize) -> usize {
        (self.shape[axis] + self.chunks[axis] - 1) / self.chunks[axis]
    }

    /// Total number of chunks.
    pub fn num_chunks(&self) -> usize {
        self.grid().iter().product()
    }

    /// Chunk grid coordinates of a linear chunk index.
    pub fn chunk_coords(&self, index: usize) -> Vec<usize> {
        let grid = self.grid();
        let mut coords = vec![0; grid.len()];
        let mut rest = index;
        for axis in (0..grid.len()).rev() {
            coords[axis] = rest % grid[axis];
            rest /= grid[axis];
        }
        coords
    }

    /// Linear chunk index of chunk grid coordinates.
    pub fn chunk_index(&self, coords: &[usize]) -> usize {
        let grid = self.grid();
        coords
            .iter()
            .zip(&grid)
            .fold(0, |acc, (&c, &g)| acc * g + c)
    }

    /// Global index of the first element of a chunk.
    pub fn chunk_origin(&self, coords: &[usize]) -> Vec<usize> {
        coords
            .iter()
            .zip(&self.chunks)
            .map(|(&c, &size)| c * size)
            .collect()
    }

    /// Actual shape of a chunk (edge chunks may be partial).
    pub fn chunk_shape(&self, coords: &[usize]) -> Vec<usize> {
        coords
            .iter()
            .zip(&self.chunks)
            .zip(&self.shape)
            .map(|((&c, &size), &len)| size.min(len - c * size))
            .collect()
    }

    /// Origin and shape of the chunk with the given linear index.
    pub fn chunk_region(&self, index: usize) -> (Vec<usize>, Vec<usize>) {
        let coords = self.chunk_coords(index);
        (self.chunk_origin(&coords), self.chunk_shape(&coords))
    }

    /// Linear indices of all chunks intersecting a region.
    pub fn overlapping(&self, origin: &[usize], shape: &[usize]) -> Vec<usize> {
        if shape.iter().any(|&s| s == 0) {
            return Vec::new();
        }
        let ranges: Vec<(usize, usize)> = origin
            .iter()
            .zip(shape)
            .zip(&self.chunks)
            .map(|((&o, &s), &c)| (o / c, (o + s - 1) / c + 1))
            .collect();
        let span: Vec<usize> = ranges.iter().map(|(lo, hi)| hi - lo).collect();
        let mut out = Vec::with_capacity(span.iter().product());
        for_each_index(&span, |idx| {
            let coords: Vec<usize> = idx
                .iter()
                .zip(&ranges)
                .map(|(&i, (lo, _))| lo + i)
                .collect();
            out.push(self.chunk_index(&coords));
        });
        out
    }

    /// Layout with one axis repartitioned.
    pub fn with_chunking(&self, axis: usize, chunking: Chunking) -> Result<Self> {
        let mut chunks = self.chunks.clone();
        chunks[axis] = match chunking {
            Chunking::Whole => self.shape[axis].max(1),
            Chunking::Size(size) => size,
        };
        Self::new(self.shape.clone(), chunks)
    }
}

/// Row-major strides of a shape.
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Visit every multi-index of `shape` in row-major order.
pub fn for_each_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    if shape.iter().any(|&s| s == 0) {
        return;
    }
    let mut idx = vec![0; shape.len()];
    loop {
        f(&idx);
        let mut axis = shape.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < shape[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}

/// Copy the intersection of two blocks given in global coordinates.
pub(crate) fn copy_overlap<T: Copy>(
    src: &[T],
    src_origin: &[usize],
    src_shape: &[usize],
    dst: &mut [T],
    dst_origin: &[usize],
    dst_shape: &[usize],
) {
    let ndim = src_shape.len();
    if ndim == 0 {
        if let (Some(s), Some(d)) = (src.first(), dst.first_mut()) {
            *d = *s;
        }
        return;
    }

    let mut lo = vec![0; ndim];
    let mut extent = vec![0; ndim];
    for axis in 0..ndim {
        let start = src_origin[axis].max(dst_origin[axis]);
        let end = (src_origin[axis] + src_shape[axis]).min(dst_origin[axis] + dst_shape[axis]);
        if start >= end {
            return;
        }
        lo[axis] = start;
        extent[axis] = end - start;
    }

    let src_strides = strides(src_shape);
    let dst_strides = strides(dst_shape);
    let row = extent[ndim - 1];
    let outer = &extent[..ndim - 1];

    let offset = |idx: &[usize], origin: &[usize], strides: &[usize]| -> usize {
        let mut off = (lo[ndim - 1] - origin[ndim - 1]) * strides[ndim - 1];
        for axis in 0..ndim - 1 {
            off += (lo[axis] + idx[axis] - origin[axis]) * strides[axis];
        }
        off
    };

    let mut copy_row = |idx: &[usize]| {
        let s = offset(idx, src_origin, &src_strides);
        let d = offset(idx, dst_origin, &dst_strides);
        dst[d..d + row].copy_from_slice(&src[s..s + row]);
    };

    if outer.is_empty() {
        copy_row(&[]);
    } else {
        for_each_index(outer, |idx| copy_row(idx));
    }
}
