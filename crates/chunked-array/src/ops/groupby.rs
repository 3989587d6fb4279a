//! Calendar grouping: day-of-year groups, annual resampling, and broadcasting
//! per-group lookup tables back onto a time axis.

use std::collections::HashMap;
use std::sync::Arc;

use crate::array::{gather_region, ChunkedArray, Element, Node, Value};
use crate::axis::{Axis, Coord};
use crate::error::{ArrayError, Result};
use crate::eval::Evaluation;
use crate::graph::TaskKey;
use crate::layout::{for_each_index, strides, ChunkLayout, Chunking};
use crate::ops::aggregate::Aggregation;

/// Calendar key used to group positions along a time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    /// Day of year, 1..=366
    DayOfYear,
    /// Calendar year
    Year,
}

impl GroupKey {
    /// Name given to the group axis.
    pub fn axis_name(&self) -> &'static str {
        match self {
            GroupKey::DayOfYear => "dayofyear",
            GroupKey::Year => "year",
        }
    }

    /// Key of every position along `axis`.
    fn keys(&self, axis: &Axis) -> Result<Vec<i64>> {
        let coord = axis.coord();
        (0..coord.len())
            .map(|i| {
                let key = match self {
                    GroupKey::DayOfYear => coord.day_of_year_at(i).map(i64::from),
                    GroupKey::Year => coord.year_at(i).map(i64::from),
                };
                key.ok_or_else(|| {
                    ArrayError::invalid_coordinate(format!(
                        "cannot group {} axis '{}' by {}",
                        coord.kind(),
                        axis.name(),
                        self.axis_name()
                    ))
                })
            })
            .collect()
    }

    /// Group labels. Day-of-year always yields 1..=366 so tables built from
    /// different periods line up; years are the sorted distinct values.
    fn labels(&self, keys: &[i64]) -> Vec<i64> {
        match self {
            GroupKey::DayOfYear => (1..=366).collect(),
            GroupKey::Year => {
                let mut years = keys.to_vec();
                years.sort_unstable();
                years.dedup();
                years
            }
        }
    }

    fn axis(&self, labels: &[i64]) -> Axis {
        match self {
            GroupKey::DayOfYear => Axis::new(
                self.axis_name(),
                Coord::DayOfYear(labels.iter().map(|&l| l as u32).collect()),
            ),
            GroupKey::Year => {
                Axis::years(self.axis_name(), labels.iter().map(|&l| l as i32).collect())
            }
        }
    }

    /// Label of every position of a lookup axis holding group labels.
    fn lookup_labels(&self, axis: &Axis) -> Result<Vec<i64>> {
        match (self, axis.coord()) {
            (GroupKey::DayOfYear, Coord::DayOfYear(v)) => Ok(v.iter().map(|&d| d as i64).collect()),
            (GroupKey::Year, Coord::Year(v)) => Ok(v.iter().map(|&y| y as i64).collect()),
            (_, coord) => Err(ArrayError::invalid_coordinate(format!(
                "lookup axis '{}' is a {} axis, expected {}",
                axis.name(),
                coord.kind(),
                self.axis_name()
            ))),
        }
    }
}

/// Resampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleRule {
    /// Calendar years
    Annual,
}

/// An array grouped along one axis, ready to be reduced.
pub struct GroupBy<T: Element> {
    array: ChunkedArray<T>,
    axis: usize,
    key: GroupKey,
    labels: Vec<i64>,
    members: Arc<Vec<Vec<usize>>>,
    window: usize,
}

/// An array grouped into resampling periods.
pub struct Resampled<T: Element> {
    groups: GroupBy<T>,
}

impl<T: Element> ChunkedArray<T> {
    /// Group positions along `axis` by a calendar key.
    pub fn groupby(&self, axis: &str, key: GroupKey) -> Result<GroupBy<T>> {
        let index = self.axis_index(axis)?;
        let keys = key.keys(&self.axes()[index])?;
        let labels = key.labels(&keys);
        let position: HashMap<i64, usize> =
            labels.iter().enumerate().map(|(i, &l)| (l, i)).collect();
        let mut members = vec![Vec::new(); labels.len()];
        for (t, k) in keys.iter().enumerate() {
            if let Some(&g) = position.get(k) {
                members[g].push(t);
            }
        }
        Ok(GroupBy {
            array: self.clone(),
            axis: index,
            key,
            labels,
            members: Arc::new(members),
            window: 1,
        })
    }

    /// Group a time axis into resampling periods.
    pub fn resample(&self, axis: &str, rule: ResampleRule) -> Result<Resampled<T>> {
        let groups = match rule {
            ResampleRule::Annual => self.groupby(axis, GroupKey::Year)?,
        };
        Ok(Resampled { groups })
    }

    /// Combine every element with the entry of `lookup` for its group.
    ///
    /// `lookup` must have the same axes as `self` except that `axis` is
    /// replaced (at the same position) by an axis of group labels. Positions
    /// whose group is absent from `lookup` receive `None`.
    pub fn zip_grouped<U, V, F>(
        &self,
        axis: &str,
        key: GroupKey,
        lookup: &ChunkedArray<U>,
        op: &str,
        f: F,
    ) -> Result<ChunkedArray<V>>
    where
        U: Element,
        V: Element,
        F: Fn(T, Option<U>) -> V + Send + Sync + 'static,
    {
        let a = self.axis_index(axis)?;
        if lookup.axes().len() != self.axes().len() {
            return Err(ArrayError::axis_mismatch(
                crate::axis::describe_axes(self.axes()),
                crate::axis::describe_axes(lookup.axes()),
            ));
        }
        for (i, (mine, theirs)) in self.axes().iter().zip(lookup.axes()).enumerate() {
            if i != a && mine != theirs {
                return Err(ArrayError::axis_mismatch(
                    format!("{}[{}]", mine.name(), mine.len()),
                    format!("{}[{}]", theirs.name(), theirs.len()),
                ));
            }
        }

        let keys = key.keys(&self.axes()[a])?;
        let position: HashMap<i64, usize> = key
            .lookup_labels(&lookup.axes()[a])?
            .into_iter()
            .enumerate()
            .map(|(i, l)| (l, i))
            .collect();
        let slot: Arc<Vec<Option<usize>>> =
            Arc::new(keys.iter().map(|k| position.get(k).copied()).collect());

        let mut lookup_chunks = self.layout().chunk_sizes().to_vec();
        lookup_chunks[a] = lookup.shape()[a].max(1);
        let lookup = lookup.rechunk_to(lookup_chunks)?;

        let data = Arc::clone(self.node());
        let table = Arc::clone(lookup.node());
        let (data_id, table_id) = (data.id(), table.id());
        let data_layout = self.layout().clone();
        let table_layout = lookup.layout().clone();
        let deps_data = data_layout.clone();
        let deps_table = table_layout.clone();

        let table_chunk = move |data_layout: &ChunkLayout, table_layout: &ChunkLayout, c: usize| {
            let mut coords = data_layout.chunk_coords(c);
            coords[a] = 0;
            table_layout.chunk_index(&coords)
        };

        let node = Node::deferred(
            op,
            self.num_chunks(),
            vec![self.graph_node(), lookup.graph_node()],
            Box::new(move |c| {
                vec![
                    TaskKey::new(data_id, c),
                    TaskKey::new(table_id, table_chunk(&deps_data, &deps_table, c)),
                ]
            }),
            Box::new(move |evaluation: &Evaluation, c| {
                let (origin, shape) = data_layout.chunk_region(c);
                let block = data.chunk(evaluation, c)?;
                let lut = table.chunk(evaluation, table_chunk(&data_layout, &table_layout, c))?;
                let mut lut_shape = shape.clone();
                lut_shape[a] = table_layout.shape()[a];
                let lut_strides = strides(&lut_shape);

                let mut out = Vec::with_capacity(block.len());
                let mut flat = 0;
                for_each_index(&shape, |idx| {
                    let looked_up = slot[origin[a] + idx[a]].map(|g| {
                        let mut offset = 0;
                        for (axis, &i) in idx.iter().enumerate() {
                            let i = if axis == a { g } else { i };
                            offset += i * lut_strides[axis];
                        }
                        lut[offset]
                    });
                    out.push(f(block[flat], looked_up));
                    flat += 1;
                });
                Ok(out)
            }),
        );

        Ok(ChunkedArray::from_node(
            self.name(),
            None,
            self.axes().to_vec(),
            self.layout().clone(),
            node,
        ))
    }
}

impl<T: Element> GroupBy<T> {
    /// Group labels in output order.
    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Positions along the grouped axis belonging to each group.
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    /// Pool a centered window of `width` positions around every member.
    ///
    /// Each member contributes the values at offsets `-(width / 2)` to
    /// `width - 1 - width / 2` along the grouped axis. Members whose window
    /// runs past either end of the axis contribute nothing. The window is
    /// read from the gathered axis, so no windowed copy of the array is
    /// built; the result matches reducing `rolling_construct` with the
    /// window axis pooled.
    pub fn window(mut self, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(ArrayError::invalid_chunking("rolling window width must be > 0"));
        }
        self.window = width;
        Ok(self)
    }

    /// Reduce each group with `f`.
    ///
    /// The samples handed to `f` are the group members along the grouped
    /// axis, pooled across every axis named in `pooled`. The grouped axis is
    /// replaced by the group axis (a single chunk); pooled axes are dropped.
    pub fn reduce<U, F>(&self, pooled: &[&str], op: &str, f: F) -> Result<ChunkedArray<U>>
    where
        U: Element,
        F: Fn(&[T]) -> U + Send + Sync + 'static,
    {
        let g = self.axis;
        let input = &self.array;
        let pooled_idx: Vec<usize> = pooled
            .iter()
            .map(|name| input.axis_index(name))
            .collect::<Result<_>>()?;
        if pooled_idx.contains(&g) {
            return Err(ArrayError::invalid_coordinate(format!(
                "grouped axis '{}' cannot also be pooled",
                input.axes()[g].name()
            )));
        }

        let ndim = input.axes().len();
        let group_axis = self.key.axis(&self.labels);
        let num_groups = self.labels.len();

        // Output axis i maps to input axis out_to_in[i].
        let mut axes = Vec::new();
        let mut chunk_sizes = Vec::new();
        let mut out_to_in = Vec::new();
        for i in 0..ndim {
            if pooled_idx.contains(&i) {
                continue;
            }
            if i == g {
                axes.push(group_axis.clone());
                chunk_sizes.push(num_groups.max(1));
            } else {
                axes.push(input.axes()[i].clone());
                chunk_sizes.push(input.layout().chunk_sizes()[i]);
            }
            out_to_in.push(i);
        }
        let shape: Vec<usize> = axes.iter().map(Axis::len).collect();
        let layout = ChunkLayout::new(shape, chunk_sizes)?;

        let in_layout = input.layout().clone();
        let in_shape = in_layout.shape().to_vec();
        let out_layout = layout.clone();
        // Input region read by an output chunk: the matching block along kept
        // axes, everything along the grouped and pooled axes.
        let region_for = {
            let out_to_in = out_to_in.clone();
            move |out_layout: &ChunkLayout, c: usize| {
                let (origin, shape) = out_layout.chunk_region(c);
                let mut in_origin = vec![0; ndim];
                let mut in_region = in_shape.clone();
                for (o, &i) in out_to_in.iter().enumerate() {
                    if i != g {
                        in_origin[i] = origin[o];
                        in_region[i] = shape[o];
                    }
                }
                (in_origin, in_region)
            }
        };
        let region_deps = region_for.clone();

        let parent = Arc::clone(input.node());
        let parent_id = parent.id();
        let deps_in = in_layout.clone();
        let deps_out = out_layout.clone();
        let members = Arc::clone(&self.members);
        let width = self.window;
        let left = width / 2;
        let right = width - 1 - left;
        let axis_len = in_layout.shape()[g];

        let node = Node::deferred(
            op,
            layout.num_chunks(),
            vec![input.graph_node()],
            Box::new(move |c| {
                let (origin, shape) = region_deps(&deps_out, c);
                deps_in
                    .overlapping(&origin, &shape)
                    .into_iter()
                    .map(|p| TaskKey::new(parent_id, p))
                    .collect()
            }),
            Box::new(move |evaluation: &Evaluation, c| {
                let (_, out_shape) = out_layout.chunk_region(c);
                let (in_origin, in_region) = region_for(&out_layout, c);
                let region = gather_region(&parent, evaluation, &in_layout, &in_origin, &in_region)?;
                let in_strides = strides(&in_region);
                let pooled_shape: Vec<usize> = pooled_idx.iter().map(|&p| in_region[p]).collect();

                let mut out = Vec::with_capacity(out_shape.iter().product());
                let mut samples = Vec::new();
                for_each_index(&out_shape, |idx| {
                    let mut base = 0;
                    let mut group = 0;
                    for (o, &i) in out_to_in.iter().enumerate() {
                        if i == g {
                            group = idx[o];
                        } else {
                            base += idx[o] * in_strides[i];
                        }
                    }
                    samples.clear();
                    for &center in &members[group] {
                        if center < left || center + right >= axis_len {
                            continue;
                        }
                        for t in center - left..=center + right {
                            let at = base + t * in_strides[g];
                            if pooled_shape.is_empty() {
                                samples.push(region[at]);
                            } else {
                                for_each_index(&pooled_shape, |p| {
                                    let off: usize = p
                                        .iter()
                                        .zip(&pooled_idx)
                                        .map(|(&pi, &axis)| pi * in_strides[axis])
                                        .sum();
                                    samples.push(region[at + off]);
                                });
                            }
                        }
                    }
                    out.push(f(&samples));
                });
                Ok(out)
            }),
        );

        Ok(ChunkedArray::from_node(
            input.name(),
            input.units().map(str::to_string),
            axes,
            layout,
            node,
        ))
    }
}

impl<T: Element> Resampled<T> {
    /// Reduce each period with a custom function.
    pub fn reduce_with<U, F>(&self, op: &str, f: F) -> Result<ChunkedArray<U>>
    where
        U: Element,
        F: Fn(&[T]) -> U + Send + Sync + 'static,
    {
        self.groups.reduce(&[], op, f)
    }
}

impl Resampled<Value> {
    /// Reduce each period with a missing-aware aggregation.
    pub fn reduce(&self, aggregation: Aggregation) -> Result<ChunkedArray<Value>> {
        self.groups.reduce(
            &[],
            &format!("resample-{}", aggregation.label()),
            move |samples| aggregation.apply(samples),
        )
    }
}

impl<T: Element> ChunkedArray<T> {
    /// Rechunk so that `axis` is a single chunk, keeping the rest.
    pub fn gather_axis(&self, axis: &str) -> Result<Self> {
        self.rechunk(&[(axis, Chunking::Whole)])
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn daily(start: NaiveDate, days: usize) -> Vec<NaiveDate> {
        (0..days)
            .map(|d| start + chrono::Duration::days(d as i64))
            .collect()
    }

    fn field(dates: Vec<NaiveDate>, cells: usize, chunk: usize) -> ChunkedArray<Value> {
        let n = dates.len();
        ChunkedArray::from_vec(
            "v",
            vec![
                Axis::time("time", dates),
                Axis::values("latitude", (0..cells).map(|c| c as f64).collect()),
            ],
            (0..n * cells).map(|i| Some((i / cells) as f64)).collect(),
            &[("time", Chunking::Size(chunk))],
        )
        .unwrap()
    }

    #[test]
    fn test_groupby_day_of_year_pools_years() {
        let start = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let array = field(daily(start, 365 * 2), 2, 100);
        let grouped = array.groupby("time", GroupKey::DayOfYear).unwrap();
        assert_eq!(grouped.labels().len(), 366);
        assert_eq!(grouped.members()[0], vec![0, 365]);
        assert!(grouped.members()[365].is_empty());

        let counts = grouped
            .reduce(&[], "count", |s: &[Value]| s.len() as u32)
            .unwrap();
        assert_eq!(counts.axis_names(), vec!["dayofyear", "latitude"]);
        let values = counts.compute().unwrap();
        assert_eq!(values[0], 2);
        assert_eq!(values[365 * 2], 0);
    }

    #[test]
    fn test_groupby_pooled_axis() {
        let start = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let array = field(daily(start, 3), 4, 2);
        let pooled = array
            .groupby("time", GroupKey::DayOfYear)
            .unwrap()
            .reduce(&["latitude"], "count", |s: &[Value]| s.len())
            .unwrap();
        assert_eq!(pooled.axis_names(), vec!["dayofyear"]);
        let values = pooled.compute().unwrap();
        assert_eq!(&values[..4], &[4, 4, 4, 0]);
    }

    #[test]
    fn test_windowed_groups_match_rolling_construct() {
        let start = NaiveDate::from_ymd_opt(2001, 12, 25).unwrap();
        let data: Vec<Value> = (0..20 * 3)
            .map(|i| if i % 11 == 4 { None } else { Some(((i * 37) % 23) as f64) })
            .collect();
        let array = ChunkedArray::from_vec(
            "v",
            vec![
                Axis::time("time", daily(start, 20)),
                Axis::values("latitude", vec![0.0, 1.0, 2.0]),
            ],
            data,
            &[("time", Chunking::Size(6)), ("latitude", Chunking::Size(2))],
        )
        .unwrap();
        let sum = |s: &[Value]| Aggregation::Sum.apply(s);
        let count = |s: &[Value]| s.len();

        let windowed = array
            .groupby("time", GroupKey::DayOfYear)
            .unwrap()
            .window(5)
            .unwrap();
        let rolled = array
            .rolling_construct("time", 5, "window")
            .unwrap()
            .groupby("time", GroupKey::DayOfYear)
            .unwrap();
        assert_eq!(
            windowed.reduce(&[], "sum", sum).unwrap().compute().unwrap(),
            rolled.reduce(&["window"], "sum", sum).unwrap().compute().unwrap()
        );

        // 2001-12-25 is day 359 and has no complete window; 2001-12-27 does.
        let counts = windowed.reduce(&[], "count", count).unwrap().compute().unwrap();
        assert_eq!(counts[(359 - 1) * 3], 0);
        assert_eq!(counts[(361 - 1) * 3], 5);
        assert!(array.groupby("time", GroupKey::DayOfYear).unwrap().window(0).is_err());
    }

    #[test]
    fn test_resample_annual_mean() {
        let start = NaiveDate::from_ymd_opt(2000, 12, 30).unwrap();
        let array = field(daily(start, 4), 1, 3);
        let annual = array
            .resample("time", ResampleRule::Annual)
            .unwrap()
            .reduce(Aggregation::Mean)
            .unwrap();
        assert_eq!(annual.axes()[0], Axis::years("year", vec![2000, 2001]));
        assert_eq!(annual.compute().unwrap(), vec![Some(0.5), Some(2.5)]);
    }

    #[test]
    fn test_resample_is_idempotent_on_annual_data() {
        let array = ChunkedArray::from_vec(
            "a",
            vec![
                Axis::years("year", vec![2000, 2001, 2002]),
                Axis::values("latitude", vec![0.0, 1.0]),
            ],
            vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0), Some(6.0)],
            &[],
        )
        .unwrap();
        let again = array
            .resample("year", ResampleRule::Annual)
            .unwrap()
            .reduce(Aggregation::Mean)
            .unwrap();
        assert_eq!(again.axes(), array.axes());
        assert_eq!(again.compute().unwrap(), array.compute().unwrap());
    }

    #[test]
    fn test_zip_grouped_broadcasts_lookup() {
        let start = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let array = field(daily(start, 4), 2, 3);
        let table = ChunkedArray::from_vec(
            "thresholds",
            vec![
                Axis::new("time", Coord::DayOfYear(vec![1, 2, 3])),
                Axis::values("latitude", vec![0.0, 1.0]),
            ],
            vec![Some(10.0), Some(20.0), Some(1.0), Some(2.0), None, Some(0.5)],
            &[],
        )
        .unwrap();
        let sum = array
            .zip_grouped("time", GroupKey::DayOfYear, &table, "add", |x: Value, t| {
                match (x, t.flatten()) {
                    (Some(x), Some(t)) => Some(x + t),
                    _ => None,
                }
            })
            .unwrap();
        assert_eq!(
            sum.compute().unwrap(),
            vec![
                Some(10.0),
                Some(20.0),
                Some(2.0),
                Some(3.0),
                None,
                Some(2.5),
                None,
                None
            ]
        );
    }

    #[test]
    fn test_zip_grouped_rejects_wrong_lookup_axis() {
        let start = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let array = field(daily(start, 4), 2, 3);
        let result = array.zip_grouped("time", GroupKey::DayOfYear, &array, "bad", |x: Value, _| x);
        assert!(matches!(result, Err(ArrayError::InvalidCoordinate(_))));
    }
}
