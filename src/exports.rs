pub use crate::emc::{Emc, IterationReport, ReconstructionContext, Settings};
pub use crate::error::{EmcError, Result};
pub use crate::frames::{FrameBlock, SparseFrameSet};
pub use crate::group::{GroupChannel, LocalGroup, Solo};
pub use crate::kernel::{CompatKernel, InPlane, Volume};
pub use crate::model::{Model, ModelShape};
pub use crate::orientation::{Orientation, OrientationTable};

pub use units::todo::{Intensityf64, LogProbf64, Probabilityf64, Scalef64, Weightf64};
