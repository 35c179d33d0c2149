//! Geometric primitives shared by the forward (render) and backward
//! (back-projection) kernels.
//!
//! Both directions must use *exactly* the same mapping between detector pixels
//! and model cells, so the mapping lives here rather than in either kernel.

mod rotation;
mod stencil;

pub use rotation::{InPlaneRotation, SpatialRotation};
pub use stencil::{Stencil, bilinear, trilinear};
