//! # Coordinates
//!
//! N-dimensional coordinate arithmetic and the row-major linearization used
//! by layout and the environment. Toroidal wrapping uses floored modulo so
//! negative coordinates land inside the shape.

use serde::{Deserialize, Serialize};

/// An N-dimensional coordinate or direction vector.
pub type Coord = Vec<i32>;

/// Component-wise sum of a coordinate and a delta.
pub fn add(coord: &[i32], delta: &[i32]) -> Coord {
    coord
        .iter()
        .zip(delta.iter())
        .map(|(c, d)| c + d)
        .collect()
}

/// Delta scaled by an integer factor.
pub fn scale(delta: &[i32], factor: i32) -> Coord {
    delta.iter().map(|d| d * factor).collect()
}

/// Component-wise difference `a - b`.
pub fn sub(a: &[i32], b: &[i32]) -> Coord {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

/// True if the vector moves along exactly one axis by exactly one cell.
pub fn is_unit_vector(v: &[i32]) -> bool {
    v.iter().filter(|c| **c != 0).count() == 1 && v.iter().all(|c| c.abs() <= 1)
}

/// Maps coordinates inside a fixed shape to linear addresses and back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateConverter {
    shape: Vec<usize>,
}

impl CoordinateConverter {
    pub fn new(shape: Vec<usize>) -> Self {
        debug_assert!(!shape.is_empty() && shape.iter().all(|d| *d > 0));
        CoordinateConverter { shape }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dims(&self) -> usize {
        self.shape.len()
    }

    pub fn cell_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Floored-modulo wrap of every component into the shape.
    pub fn wrap(&self, coord: &[i32]) -> Coord {
        coord
            .iter()
            .zip(self.shape.iter())
            .map(|(c, d)| {
                let d = *d as i32;
                ((c % d) + d) % d
            })
            .collect()
    }

    pub fn contains(&self, coord: &[i32]) -> bool {
        coord.len() == self.shape.len()
            && coord
                .iter()
                .zip(self.shape.iter())
                .all(|(c, d)| *c >= 0 && (*c as usize) < *d)
    }

    /// Row-major linear address; `None` outside the shape.
    pub fn linearize(&self, coord: &[i32]) -> Option<usize> {
        if !self.contains(coord) {
            return None;
        }
        let mut index = 0usize;
        for (c, d) in coord.iter().zip(self.shape.iter()) {
            index = index * d + *c as usize;
        }
        Some(index)
    }

    /// Inverse of [`linearize`](Self::linearize).
    pub fn delinearize(&self, mut index: usize) -> Coord {
        let mut coord = vec![0i32; self.shape.len()];
        for (slot, d) in coord.iter_mut().zip(self.shape.iter()).rev() {
            *slot = (index % d) as i32;
            index /= d;
        }
        coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wrap_floored_modulo() {
        let conv = CoordinateConverter::new(vec![4, 4]);
        assert_eq!(conv.wrap(&[-1, 5]), vec![3, 1]);
        assert_eq!(conv.wrap(&[4, -4]), vec![0, 0]);
    }

    #[test]
    fn test_linearize_is_row_major() {
        let conv = CoordinateConverter::new(vec![2, 3]);
        assert_eq!(conv.linearize(&[0, 0]), Some(0));
        assert_eq!(conv.linearize(&[0, 2]), Some(2));
        assert_eq!(conv.linearize(&[1, 0]), Some(3));
        assert_eq!(conv.linearize(&[2, 0]), None);
    }

    #[test]
    fn test_unit_vector() {
        assert!(is_unit_vector(&[0, -1]));
        assert!(!is_unit_vector(&[1, 1]));
        assert!(!is_unit_vector(&[0, 0]));
        assert!(!is_unit_vector(&[2, 0]));
    }

    proptest! {
        #[test]
        fn prop_linearize_delinearize_roundtrip(
            x in 0i32..7,
            y in 0i32..5,
            z in 0i32..3,
        ) {
            let conv = CoordinateConverter::new(vec![7, 5, 3]);
            let coord = vec![x, y, z];
            let index = conv.linearize(&coord).expect("inside shape");
            prop_assert!(index < conv.cell_count());
            prop_assert_eq!(conv.delinearize(index), coord);
        }

        #[test]
        fn prop_linearize_is_injective(
            a in prop::collection::vec(0i32..6, 2),
            b in prop::collection::vec(0i32..6, 2),
        ) {
            let conv = CoordinateConverter::new(vec![6, 6]);
            let ia = conv.linearize(&a).expect("inside shape");
            let ib = conv.linearize(&b).expect("inside shape");
            prop_assert_eq!(ia == ib, a == b);
        }
    }
}
