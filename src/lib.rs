mod exports;
pub use exports::*;

pub mod config;
pub mod emc;
pub mod error;
pub mod frames;
pub mod group;
pub mod io;
pub mod kernel;
pub mod model;
pub mod orientation;
pub mod partition;
pub mod probability;
pub mod streams;
pub mod synthetic;
pub mod utils;
