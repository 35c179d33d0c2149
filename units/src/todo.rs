/// Units which are simply type aliases for `f64` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// Intensities and probabilities are dimensionless in this problem, but we
/// still want some clues in the source as to what they represent.

pub type Intensityf64   = f64;
pub type Probabilityf64 = f64;
pub type LogProbf64     = f64;
pub type Weightf64      = f64;
pub type Scalef64       = f64;
/// Voxel-unit coordinates of the model grid
pub type Voxelf64       = f64;
