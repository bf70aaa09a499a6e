//! Space-filling-curve redistribution (spec §2 "Hilbert SFC module",
//! §4.1).

pub mod hilbert;
pub mod redistribution;

pub use redistribution::{global_bounding_box, redistribute, Redistributed};
