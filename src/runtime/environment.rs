//! # Environment
//!
//! The world: a dense N-dimensional grid of molecules plus a parallel
//! per-cell owner map. Toroidal environments wrap coordinates with floored
//! modulo; bounded environments reject out-of-range coordinates.

use crate::runtime::coords::{self, Coord, CoordinateConverter};
use crate::runtime::molecule::Molecule;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape and wrapping behaviour of a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProperties {
    pub shape: Vec<usize>,
    pub toroidal: bool,
}

impl EnvironmentProperties {
    pub fn new(shape: Vec<usize>, toroidal: bool) -> Self {
        EnvironmentProperties { shape, toroidal }
    }

    pub fn dims(&self) -> usize {
        self.shape.len()
    }
}

/// Environment access errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("coordinate {coord:?} is outside the bounded world")]
    OutOfBounds { coord: Coord },

    #[error("coordinate has {got} components, world has {expected} dimensions")]
    DimensionMismatch { got: usize, expected: usize },
}

/// Dense molecule grid with per-cell ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    props: EnvironmentProperties,
    converter: CoordinateConverter,
    cells: Vec<Molecule>,
    owners: Vec<u64>,
}

impl Environment {
    pub fn new(props: EnvironmentProperties) -> Self {
        let converter = CoordinateConverter::new(props.shape.clone());
        let count = converter.cell_count();
        Environment {
            props,
            converter,
            cells: vec![Molecule::empty(); count],
            owners: vec![0; count],
        }
    }

    pub fn properties(&self) -> &EnvironmentProperties {
        &self.props
    }

    pub fn shape(&self) -> &[usize] {
        &self.props.shape
    }

    pub fn dims(&self) -> usize {
        self.props.shape.len()
    }

    pub fn converter(&self) -> &CoordinateConverter {
        &self.converter
    }

    /// Canonical form of a coordinate: wrapped on a torus, unchanged otherwise.
    pub fn normalize(&self, coord: &[i32]) -> Coord {
        if self.props.toroidal {
            self.converter.wrap(coord)
        } else {
            coord.to_vec()
        }
    }

    fn index(&self, coord: &[i32]) -> Result<usize, EnvError> {
        if coord.len() != self.dims() {
            return Err(EnvError::DimensionMismatch {
                got: coord.len(),
                expected: self.dims(),
            });
        }
        let canonical = self.normalize(coord);
        self.converter
            .linearize(&canonical)
            .ok_or(EnvError::OutOfBounds { coord: canonical })
    }

    pub fn get_molecule(&self, coord: &[i32]) -> Result<Molecule, EnvError> {
        Ok(self.cells[self.index(coord)?])
    }

    pub fn set_molecule(&mut self, molecule: Molecule, coord: &[i32]) -> Result<(), EnvError> {
        let index = self.index(coord)?;
        self.cells[index] = molecule;
        Ok(())
    }

    pub fn get_owner(&self, coord: &[i32]) -> Result<u64, EnvError> {
        Ok(self.owners[self.index(coord)?])
    }

    pub fn set_owner(&mut self, coord: &[i32], id: u64) -> Result<(), EnvError> {
        let index = self.index(coord)?;
        self.owners[index] = id;
        Ok(())
    }

    /// True when no cell within the Chebyshev `radius` around `center` has a
    /// non-zero owner. Cells outside a bounded world are ignored.
    pub fn is_area_unowned(&self, center: &[i32], radius: i32) -> bool {
        let dims = self.dims();
        let mut offset = vec![-radius; dims];
        loop {
            let coord = coords::add(center, &offset);
            if let Ok(index) = self.index(&coord) {
                if self.owners[index] != 0 {
                    return false;
                }
            }
            // odometer increment over the Chebyshev cube
            let mut axis = dims;
            loop {
                if axis == 0 {
                    return true;
                }
                axis -= 1;
                offset[axis] += 1;
                if offset[axis] <= radius {
                    break;
                }
                offset[axis] = -radius;
            }
        }
    }

    /// One step from `coord` along `direction`.
    pub fn get_next_position(&self, coord: &[i32], direction: &[i32]) -> Coord {
        self.normalize(&coords::add(coord, direction))
    }
}
