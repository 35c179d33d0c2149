pub mod emc;

pub use emc::{Config, Dimensions, Engine, Emc, Parameters, read_config_file};
