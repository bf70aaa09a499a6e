//! Bulk SFC redistribution (spec §4.1): seeds geometric locality by
//! reordering the whole point set along the Hilbert curve and handing
//! each process a contiguous range of it.
//!
//! The five steps of spec §4.1 map onto this module as:
//! (i) global bounding box — an all-reduce of local min/max;
//! (ii) per-point Hilbert index — [`crate::sfc::hilbert`];
//! (iii) parallel sample sort of `(index, globalId)` pairs —
//!       [`sample_sort_keys`];
//! (iv) the sorted local list becomes the new ownership set —
//!      [`GeneralDistribution`];
//! (v) re-expand coordinates/weights by an all-to-all keyed on the same
//!     bucket assignment as the key sort.
//!
//! The teacher's `hilbert_curve_reorder` does steps (ii)+local sort in
//! one process; this generalizes it to a genuinely distributed sample
//! sort (splitters drawn from a gathered sample, buckets routed by
//! all-to-all) since spec §4.1 requires the sort to scale across `p`
//! processes rather than collect all points on one.

use crate::comm::{exchange_counts, Communicator, GeneralDistribution, ReduceOp};
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, PointCloud, WeightTable};
use crate::sfc::hilbert::point_to_hilbert_index;
use rayon::prelude::*;

/// The outcome of a full SFC redistribution.
pub struct Redistributed {
    pub points: PointCloud,
    pub weights: WeightTable,
    pub distribution: GeneralDistribution,
}

/// Computes the global bounding box of a point cloud that may be empty
/// or absent on any given process (spec §4.1 step (i), §4.3 "Failure
/// modes": "Empty local set on any process is permitted").
pub fn global_bounding_box(
    comm: &dyn Communicator,
    points: &PointCloud,
    dimensions: usize,
) -> Result<BoundingBox> {
    let local_min = match BoundingBox::of_local(points) {
        Some(b) => b.min,
        None => vec![f64::INFINITY; dimensions],
    };
    let local_max = match BoundingBox::of_local(points) {
        Some(b) => b.max,
        None => vec![f64::NEG_INFINITY; dimensions],
    };
    let min = comm.all_reduce(&local_min, ReduceOp::Min)?;
    let max = comm.all_reduce(&local_max, ReduceOp::Max)?;
    Ok(BoundingBox { min, max })
}

/// Picks `p - 1` splitters from a set of local samples gathered across
/// every process, so that every process derives the same splitters
/// deterministically without an extra broadcast.
fn choose_splitters(comm: &dyn Communicator, local_keys_sorted: &[f64]) -> Result<Vec<f64>> {
    let p = comm.size();
    if p <= 1 {
        return Ok(Vec::new());
    }
    // Oversample so small local sets still contribute useful splitters.
    let sample_count = (p - 1).min(local_keys_sorted.len());
    let samples: Vec<f64> = if local_keys_sorted.is_empty() {
        Vec::new()
    } else {
        (0..sample_count)
            .map(|i| {
                let pos = (i + 1) * local_keys_sorted.len() / (sample_count + 1);
                local_keys_sorted[pos.min(local_keys_sorted.len() - 1)]
            })
            .collect()
    };
    let mut gathered = comm.all_gather_varcount(&samples)?;
    gathered.par_sort_by(|a, b| a.partial_cmp(b).unwrap());
    if gathered.is_empty() {
        return Ok(Vec::new());
    }
    let splitters: Vec<f64> = (1..p)
        .map(|i| {
            let pos = (i * gathered.len() / p).min(gathered.len() - 1);
            gathered[pos]
        })
        .collect();
    Ok(splitters)
}

fn bucket_of(key: f64, splitters: &[f64]) -> usize {
    splitters.partition_point(|&s| key > s)
}

/// Sample-sorts `(hilbert_index, global_id)` pairs across every process
/// (spec §4.1 step (iii)): after this call, the pairs a process holds
/// are a contiguous, globally-sorted range of the curve. This is split
/// out from [`redistribute`] because it is independently useful (and
/// independently testable) from the coordinate/weight re-expansion.
pub fn sample_sort_keys(
    comm: &dyn Communicator,
    local_keys: &[f64],
    local_global_ids: &[usize],
) -> Result<(Vec<f64>, Vec<usize>)> {
    let n = local_keys.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.par_sort_by(|&a, &b| {
        local_keys[a]
            .partial_cmp(&local_keys[b])
            .unwrap()
            .then(local_global_ids[a].cmp(&local_global_ids[b]))
    });
    let sorted_keys: Vec<f64> = order.iter().map(|&i| local_keys[i]).collect();

    let splitters = choose_splitters(comm, &sorted_keys)?;
    let p = comm.size();

    let mut send_counts = vec![0usize; p];
    for &k in &sorted_keys {
        send_counts[bucket_of(k, &splitters)] += 1;
    }
    // `sorted_keys` is sorted, so bucket membership is monotone: we can
    // simply count per bucket without materializing bucket indices.

    let sorted_ids: Vec<f64> = order.iter().map(|&i| local_global_ids[i] as f64).collect();

    let recv_counts = exchange_counts(comm, &send_counts)?;
    let keys_recv = comm.all_to_all_varcount(&sorted_keys, &send_counts, &recv_counts)?;
    let ids_recv = comm.all_to_all_varcount(&sorted_ids, &send_counts, &recv_counts)?;

    let n_recv = keys_recv.len();
    let mut final_order: Vec<usize> = (0..n_recv).collect();
    final_order.par_sort_by(|&a, &b| {
        keys_recv[a]
            .partial_cmp(&keys_recv[b])
            .unwrap()
            .then((ids_recv[a] as usize).cmp(&(ids_recv[b] as usize)))
    });

    let keys_final: Vec<f64> = final_order.iter().map(|&i| keys_recv[i]).collect();
    let ids_final: Vec<usize> = final_order.iter().map(|&i| ids_recv[i] as usize).collect();
    Ok((keys_final, ids_final))
}

/// Performs the full SFC redistribution of spec §4.1: computes the
/// global bounding box, the per-point Hilbert indices, the distributed
/// sample sort, and re-expands coordinates and weights to match.
pub fn redistribute(
    comm: &dyn Communicator,
    points: &PointCloud,
    weights: &WeightTable,
    local_global_ids: &[usize],
    bits: u32,
) -> Result<Redistributed> {
    let dims = points.dimensions();
    let w = weights.num_axes();
    if points.len() != local_global_ids.len() || points.len() != weights.len() {
        return Err(Error::InvalidArgument(
            "points, weights and global ids must be co-distributed with equal local counts".into(),
        ));
    }

    let bbox = global_bounding_box(comm, points, dims)?;

    let n = points.len();
    let mut order: Vec<usize> = (0..n).collect();
    let mut keys = vec![0.0f64; n];
    for i in 0..n {
        keys[i] = point_to_hilbert_index(points.point(i), &bbox, bits)?;
    }
    order.par_sort_by(|&a, &b| {
        keys[a]
            .partial_cmp(&keys[b])
            .unwrap()
            .then(local_global_ids[a].cmp(&local_global_ids[b]))
    });

    let sorted_keys: Vec<f64> = order.iter().map(|&i| keys[i]).collect();
    let splitters = choose_splitters(comm, &sorted_keys)?;
    let p = comm.size();

    let mut send_counts = vec![0usize; p];
    for &k in &sorted_keys {
        send_counts[bucket_of(k, &splitters)] += 1;
    }
    let recv_counts = exchange_counts(comm, &send_counts)?;

    let sorted_ids: Vec<f64> = order.iter().map(|&i| local_global_ids[i] as f64).collect();
    let sorted_coords: Vec<f64> = order
        .iter()
        .flat_map(|&i| points.point(i).iter().copied())
        .collect();
    let sorted_weights: Vec<f64> = order
        .iter()
        .flat_map(|&i| weights.weights(i).iter().copied())
        .collect();

    let coord_send_counts: Vec<usize> = send_counts.iter().map(|&c| c * dims).collect();
    let coord_recv_counts: Vec<usize> = recv_counts.iter().map(|&c| c * dims).collect();
    let weight_send_counts: Vec<usize> = send_counts.iter().map(|&c| c * w).collect();
    let weight_recv_counts: Vec<usize> = recv_counts.iter().map(|&c| c * w).collect();

    let keys_recv = comm.all_to_all_varcount(&sorted_keys, &send_counts, &recv_counts)?;
    let ids_recv = comm.all_to_all_varcount(&sorted_ids, &send_counts, &recv_counts)?;
    let coords_recv =
        comm.all_to_all_varcount(&sorted_coords, &coord_send_counts, &coord_recv_counts)?;
    let weights_recv =
        comm.all_to_all_varcount(&sorted_weights, &weight_send_counts, &weight_recv_counts)?;

    let n_recv = keys_recv.len();
    let mut final_order: Vec<usize> = (0..n_recv).collect();
    final_order.par_sort_by(|&a, &b| {
        keys_recv[a]
            .partial_cmp(&keys_recv[b])
            .unwrap()
            .then((ids_recv[a] as usize).cmp(&(ids_recv[b] as usize)))
    });

    let mut final_coords = Vec::with_capacity(n_recv * dims);
    let mut final_weights = Vec::with_capacity(n_recv * w);
    let mut final_ids = Vec::with_capacity(n_recv);
    for &i in &final_order {
        final_coords.extend_from_slice(&coords_recv[i * dims..(i + 1) * dims]);
        final_weights.extend_from_slice(&weights_recv[i * w..(i + 1) * w]);
        final_ids.push(ids_recv[i] as usize);
    }

    Ok(Redistributed {
        points: PointCloud::from_flat(dims, final_coords)?,
        weights: WeightTable::from_flat(w, final_weights)?,
        distribution: GeneralDistribution::new(final_ids),
    })
}
