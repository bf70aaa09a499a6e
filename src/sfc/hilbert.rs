//! The Hilbert space-filling curve (spec §4.1 "Space-filling-curve
//! redistribution"): maps a `d`-dimensional point in a bounding box to a
//! scalar index in `[0,1)`, and back.
//!
//! The teacher's own `algorithms/hilbert_curve.rs` hand-rolls a
//! 2D-only encode/decode pair (`encode`/`interleave_bits`, after XIAN LIU
//! & GÜNTHER SCHRACK). Spec §4.1 requires `d ∈ {2,3}` and an inverse map
//! the teacher doesn't provide, so this module generalizes the same
//! "interleave bits across dimensions" idea to arbitrary dimension with
//! both directions, using Skilling's transpose representation
//! ("Programming the Hilbert Curve", 2004), which is the standard
//! dimension-generic formulation of the same bit-interleaving technique.

use crate::error::{Error, Result};
use crate::geometry::BoundingBox;

/// Converts Cartesian integer coordinates (each in `[0, 2^bits)`) into
/// Skilling's "transpose" representation in place: afterwards, `x`'s
/// bits, read column-major (highest bit of each axis first, axis 0
/// first within each column), are the bits of the Hilbert distance.
fn axes_to_transpose(x: &mut [u64], bits: u32) {
    let n = x.len();
    let mut q: u64 = 1 << (bits - 1);
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t: u64 = 0;
    let mut q = 1u64 << (bits - 1);
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for xi in x.iter_mut() {
        *xi ^= t;
    }
}

/// The inverse of [`axes_to_transpose`].
fn transpose_to_axes(x: &mut [u64], bits: u32) {
    let n = x.len();
    let t = x[n - 1] >> 1;
    for i in (1..n).rev() {
        x[i] ^= x[i - 1];
    }
    x[0] ^= t;
    let mut q: u64 = 2;
    while q != (1u64 << bits) {
        let p = q - 1;
        for i in (0..n).rev() {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q <<= 1;
    }
}

/// Packs the transpose representation into a single integer Hilbert
/// distance: bit `bits-1` of axis 0, then bit `bits-1` of axis 1, ...,
/// then bit `bits-2` of axis 0, and so on.
fn pack(x: &[u64], bits: u32) -> u64 {
    let mut h = 0u64;
    for bit in (0..bits).rev() {
        for &xi in x {
            h = (h << 1) | ((xi >> bit) & 1);
        }
    }
    h
}

fn unpack(mut h: u64, dims: usize, bits: u32) -> Vec<u64> {
    let mut x = vec![0u64; dims];
    for bit in 0..bits {
        for i in (0..dims).rev() {
            x[i] |= (h & 1) << bit;
            h >>= 1;
        }
    }
    x
}

/// Maximum `bits * dims` this module supports: the packed distance must
/// fit in a `u64`.
pub fn max_resolution(dims: usize) -> u32 {
    (64 / dims.max(1)) as u32
}

/// Encodes a point's integer grid coordinates (each in `[0, 2^bits)`)
/// into its Hilbert distance.
pub fn encode(coords: &[u64], bits: u32) -> u64 {
    let mut x = coords.to_vec();
    axes_to_transpose(&mut x, bits);
    pack(&x, bits)
}

/// Decodes a Hilbert distance back into integer grid coordinates.
pub fn decode(distance: u64, dims: usize, bits: u32) -> Vec<u64> {
    let mut x = unpack(distance, dims, bits);
    transpose_to_axes(&mut x, bits);
    x
}

/// Maps a floating-point point inside `bbox` to a Hilbert index in
/// `[0,1)` at the given bit resolution (spec §4.1 step (ii)). Fails with
/// [`Error::DegenerateRange`] if any axis of `bbox` has zero extent, and
/// with an invalid-argument error if `bits * dims` would overflow a
/// 64-bit distance.
pub fn point_to_hilbert_index(point: &[f64], bbox: &BoundingBox, bits: u32) -> Result<f64> {
    let dims = point.len();
    if bits > max_resolution(dims) {
        return Err(Error::InvalidArgument(format!(
            "sfc_resolution {} bits exceeds the {} bits supported for {} dimensions",
            bits,
            max_resolution(dims),
            dims
        )));
    }
    let scale = ((1u64 << bits) - 1) as f64;
    let mut grid = Vec::with_capacity(dims);
    for a in 0..dims {
        let lo = bbox.min[a];
        let hi = bbox.max[a];
        if (hi - lo).abs() < f64::EPSILON {
            return Err(Error::DegenerateRange { axis: a });
        }
        let t = ((point[a] - lo) / (hi - lo)).clamp(0.0, 1.0);
        grid.push((t * scale).round() as u64);
    }
    let h = encode(&grid, bits);
    let max_h = ((1u128 << (bits as u128 * dims as u128)) - 1) as f64;
    Ok(h as f64 / (max_h + 1.0))
}

/// Inverse of [`point_to_hilbert_index`]: maps an index in `[0,1)` back
/// to a representative point inside `bbox` (spec §4.2 "from-SFC-only"
/// mode).
pub fn hilbert_index_to_point(index: f64, dims: usize, bbox: &BoundingBox, bits: u32) -> Vec<f64> {
    let max_h = (1u128 << (bits as u128 * dims as u128)) as f64;
    let h = (index.clamp(0.0, 1.0) * max_h) as u64;
    let grid = decode(h, dims, bits);
    let scale = ((1u64 << bits) - 1) as f64;
    (0..dims)
        .map(|a| {
            let lo = bbox.min[a];
            let hi = bbox.max[a];
            lo + (grid[a] as f64 / scale) * (hi - lo)
        })
        .collect()
}
