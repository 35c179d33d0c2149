//! Dense intensity models: a square (2-D) or cubic (3-D) grid of voxels,
//! stored row-major in a flat buffer.

use std::ops::{Index, IndexMut};

use rand::{Rng, SeedableRng, rngs::StdRng};

use units::todo::Intensityf64;

use crate::utils::l2_distance;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelShape {
    Plane(usize),
    Volume(usize),
}

impl ModelShape {
    /// Edge length
    pub fn size(&self) -> usize {
        match *self { Self::Plane(n) | Self::Volume(n) => n }
    }

    /// Number of voxels
    pub fn len(&self) -> usize {
        match *self {
            Self::Plane (n) => n * n,
            Self::Volume(n) => n * n * n,
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

pub type ModelData = Vec<Intensityf64>;

#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub shape: ModelShape,
    pub data: ModelData,
}

impl Model {

    pub fn zeros(shape: ModelShape) -> Self {
        Self { shape, data: vec![0.0; shape.len()] }
    }

    pub fn new(shape: ModelShape, data: ModelData) -> Option<Self> {
        (data.len() == shape.len()).then_some(Self { shape, data })
    }

    /// Uniform random intensities in `[0, mean_intensity)`, reproducible when
    /// a seed is given
    pub fn random(shape: ModelShape, mean_intensity: f64, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None       => StdRng::from_entropy(),
        };
        let data = (0..shape.len()).map(|_| rng.gen::<f64>() * mean_intensity).collect();
        Self { shape, data }
    }

    pub fn size(&self) -> usize { self.shape.size() }
    pub fn len (&self) -> usize { self.data.len() }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }
    pub fn sum (&self) -> f64 { self.data.iter().sum() }

    /// Euclidean norm of the difference between two models of equal shape
    pub fn change(&self, previous: &Self) -> f64 {
        l2_distance(&self.data, &previous.data)
    }
}

impl Index<usize> for Model {
    type Output = Intensityf64;
    fn index(&self, i: usize) -> &Self::Output { &self.data[i] }
}

impl IndexMut<usize> for Model {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output { &mut self.data[i] }
}
