//! Axis reordering between native (x, y, z) order and sink order (z, y, x).
//!
//! Volumes are addressed natively with x first. Chunked containers store the
//! slowest-varying axis first, so every coordinate triple must be reversed on
//! its way to the sink. [`SinkTriple`] can only be built through
//! [`to_sink_order`] (or explicitly from sink-side data), which makes a missed
//! reordering a type error instead of silently corrupted voxel addressing.

use crate::types::Triple;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reverse a triple. The mapping is its own inverse.
pub fn reorder<T: Copy>(triple: [T; 3]) -> [T; 3] {
    [triple[2], triple[1], triple[0]]
}

/// A triple expressed in sink order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SinkTriple([usize; 3]);

impl SinkTriple {
    /// Wrap a triple that is already in sink order (e.g. read back from a store)
    pub fn from_sink_order(raw: [usize; 3]) -> Self {
        Self(raw)
    }

    /// The raw triple in sink order
    pub fn get(&self) -> [usize; 3] {
        self.0
    }

    /// Product of the components
    pub fn volume(&self) -> usize {
        self.0.iter().product()
    }
}

impl fmt::Display for SinkTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.0[0], self.0[1], self.0[2])
    }
}

/// Convert a native triple into sink order
pub fn to_sink_order(native: Triple) -> SinkTriple {
    SinkTriple(reorder(native))
}

/// Convert a sink-order triple back to native order
pub fn from_sink_order(sink: SinkTriple) -> Triple {
    reorder(sink.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_reverses() {
        assert_eq!(reorder([1, 2, 3]), [3, 2, 1]);
        assert_eq!(to_sink_order([10, 20, 4]).get(), [4, 20, 10]);
    }

    #[test]
    fn test_reorder_is_self_inverse() {
        for a in 0..6usize {
            for b in 0..6usize {
                for c in 0..6usize {
                    let t = [a * 7, b + 1, c * c];
                    assert_eq!(reorder(reorder(t)), t);
                    assert_eq!(from_sink_order(to_sink_order(t)), t);
                }
            }
        }
    }

    #[test]
    fn test_sink_triple_volume() {
        assert_eq!(to_sink_order([4, 4, 2]).volume(), 32);
    }
}
