//! Geometric primitives shared by the SFC, k-means and graph modules
//! (spec §3 "Data model", §9 design note on flat, data-oriented layout).
//!
//! Points are stored in a single flat buffer rather than as a `Vec` of
//! owning per-point structs, following spec §9's explicit preference for
//! "a flat withinBlock index + prefix sum" style representation over
//! nested owning containers.

use crate::error::{Error, Result};
use nalgebra::DVector;

/// A column-major-free, row-major flat store of `n` points in
/// `dimensions` dimensions: point `i`'s coordinates are
/// `coords[i*dimensions .. (i+1)*dimensions]`.
#[derive(Debug, Clone)]
pub struct PointCloud {
    dimensions: usize,
    coords: Vec<f64>,
}

impl PointCloud {
    /// Builds a point cloud from a flat coordinate buffer. `coords.len()`
    /// must be a multiple of `dimensions`.
    pub fn from_flat(dimensions: usize, coords: Vec<f64>) -> Result<Self> {
        if dimensions == 0 || coords.len() % dimensions != 0 {
            return Err(Error::InvalidArgument(format!(
                "coordinate buffer length {} is not a multiple of dimensions {}",
                coords.len(),
                dimensions
            )));
        }
        for &c in &coords {
            if !c.is_finite() {
                return Err(Error::Numeric(format!("non-finite coordinate {}", c)));
            }
        }
        Ok(PointCloud { dimensions, coords })
    }

    /// Number of points owned locally.
    pub fn len(&self) -> usize {
        self.coords.len() / self.dimensions.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Coordinates of point `i`.
    pub fn point(&self, i: usize) -> &[f64] {
        let d = self.dimensions;
        &self.coords[i * d..(i + 1) * d]
    }

    /// Mutable coordinates of point `i`.
    pub fn point_mut(&mut self, i: usize) -> &mut [f64] {
        let d = self.dimensions;
        &mut self.coords[i * d..(i + 1) * d]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.coords.chunks_exact(self.dimensions)
    }

    /// Raw flat buffer, for collective exchange.
    pub fn as_flat(&self) -> &[f64] {
        &self.coords
    }

    pub fn into_flat(self) -> Vec<f64> {
        self.coords
    }
}

/// A `w`-wide table of non-negative per-point scalar weights, stored flat
/// the same way as [`PointCloud`] (point-major: weight axes for point
/// `i` are contiguous).
#[derive(Debug, Clone)]
pub struct WeightTable {
    num_axes: usize,
    weights: Vec<f64>,
}

impl WeightTable {
    pub fn from_flat(num_axes: usize, weights: Vec<f64>) -> Result<Self> {
        if num_axes == 0 || weights.len() % num_axes != 0 {
            return Err(Error::InvalidArgument(format!(
                "weight buffer length {} is not a multiple of num_axes {}",
                weights.len(),
                num_axes
            )));
        }
        for &w in &weights {
            if w.is_nan() || w < 0.0 {
                return Err(Error::Numeric(format!("invalid node weight {}", w)));
            }
        }
        Ok(WeightTable { num_axes, weights })
    }

    pub fn num_axes(&self) -> usize {
        self.num_axes
    }

    pub fn len(&self) -> usize {
        self.weights.len() / self.num_axes.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn weights(&self, i: usize) -> &[f64] {
        let w = self.num_axes;
        &self.weights[i * w..(i + 1) * w]
    }

    /// `normalizedWeight[w][x] = weight[w][x] / Σ_w' weight[w'][x]`
    /// (spec §4.3 "Definitions"), or `1.0` for the single-weight case.
    pub fn normalized_weights(&self, i: usize) -> Vec<f64> {
        let ws = self.weights(i);
        if self.num_axes == 1 {
            return vec![1.0];
        }
        let total: f64 = ws.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.num_axes];
        }
        ws.iter().map(|w| w / total).collect()
    }

    pub fn as_flat(&self) -> &[f64] {
        &self.weights
    }
}

/// A block center: one `d`-dimensional point per block (spec §3
/// "Center"). Represented with `nalgebra::DVector` since centers are few
/// (one per block) and benefit from the teacher's vector-arithmetic
/// idiom (`(c1 - c2).norm()`), unlike the bulk point cloud.
pub type Center = DVector<f64>;

pub fn center_from_slice(coords: &[f64]) -> Center {
    DVector::from_row_slice(coords)
}

/// Squared Euclidean distance between a point (as a slice) and a center.
pub fn distance_squared(point: &[f64], center: &Center) -> f64 {
    point
        .iter()
        .zip(center.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

/// Axis-aligned bounding box over a (possibly empty, possibly
/// zero-volume) local point set (spec §3 "Bounding box").
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl BoundingBox {
    /// Computes the local bounding box of a (possibly empty) point
    /// cloud. Returns `None` when the cloud is empty: spec §4.1 "Empty
    /// local set on any process is permitted".
    pub fn of_local(points: &PointCloud) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let d = points.dimensions();
        let mut min = vec![f64::INFINITY; d];
        let mut max = vec![f64::NEG_INFINITY; d];
        for p in points.iter() {
            for a in 0..d {
                if p[a] < min[a] {
                    min[a] = p[a];
                }
                if p[a] > max[a] {
                    max[a] = p[a];
                }
            }
        }
        Some(BoundingBox { min, max })
    }

    /// `true` when every axis has zero extent: the degenerate case spec
    /// §9 leaves unspecified (here resolved by falling back to an
    /// unpruned scan, see `kmeans::assign::prune_centers`).
    pub fn is_degenerate(&self) -> bool {
        self.min
            .iter()
            .zip(self.max.iter())
            .all(|(lo, hi)| (hi - lo).abs() < f64::EPSILON)
    }

    /// Minimum Euclidean distance from this box to an external point
    /// (zero when the point lies inside the box on every axis).
    pub fn distance_to_point(&self, point: &[f64]) -> f64 {
        let mut acc = 0.0;
        for a in 0..self.min.len() {
            let d = if point[a] < self.min[a] {
                self.min[a] - point[a]
            } else if point[a] > self.max[a] {
                point[a] - self.max[a]
            } else {
                0.0
            };
            acc += d * d;
        }
        acc.sqrt()
    }

    /// Diagonal length, used by the sampling schedule's movement
    /// threshold (spec §4.4).
    pub fn diagonal(&self) -> f64 {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(lo, hi)| (hi - lo) * (hi - lo))
            .sum::<f64>()
            .sqrt()
    }
}

/// Weighted centroid of a set of points (spec §4.5 "Center
/// recomputation"). `weights` must have the same length as `points`.
pub fn weighted_centroid(points: &[&[f64]], weights: &[f64], dimensions: usize) -> Option<Vec<f64>> {
    let total_weight: f64 = weights.iter().sum();
    if points.is_empty() || total_weight <= 0.0 {
        return None;
    }
    let mut acc = vec![0.0; dimensions];
    for (p, w) in points.iter().zip(weights) {
        for a in 0..dimensions {
            acc[a] += p[a] * w;
        }
    }
    for a in acc.iter_mut() {
        *a /= total_weight;
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_cloud_indexing() {
        let pc = PointCloud::from_flat(2, vec![0., 0., 1., 1., 2., 2.]).unwrap();
        assert_eq!(pc.len(), 3);
        assert_eq!(pc.point(1), &[1., 1.]);
    }

    #[test]
    fn rejects_non_finite_coordinate() {
        let err = PointCloud::from_flat(2, vec![0., f64::NAN]);
        assert!(err.is_err());
    }

    #[test]
    fn bounding_box_basic() {
        let pc = PointCloud::from_flat(2, vec![0., 0., 3., 4., -1., 2.]).unwrap();
        let bbox = BoundingBox::of_local(&pc).unwrap();
        assert_eq!(bbox.min, vec![-1., 0.]);
        assert_eq!(bbox.max, vec![3., 4.]);
        assert!(!bbox.is_degenerate());
    }

    #[test]
    fn bounding_box_empty_is_none() {
        let pc = PointCloud::from_flat(2, vec![]).unwrap();
        assert!(BoundingBox::of_local(&pc).is_none());
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let wt = WeightTable::from_flat(2, vec![1., 3., 2., 2.]).unwrap();
        let n = wt.normalized_weights(0);
        assert_ulps_eq!(n[0] + n[1], 1.0);
    }

    #[test]
    fn weighted_centroid_basic() {
        let p0 = [0.0, 0.0];
        let p1 = [2.0, 0.0];
        let centroid = weighted_centroid(&[&p0, &p1], &[1.0, 1.0], 2).unwrap();
        assert_ulps_eq!(centroid[0], 1.0);
    }
}
