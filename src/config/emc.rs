//! Configuration file parser for EMC

use std::fs;
use std::str::FromStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, de};

use units::{Information, gibibytes};

use crate::error::{EmcError, Result};

fn deserialize_uom<'d, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    String::deserialize(deserializer)?
        .parse::<T>()
        .map_err(de::Error::custom)
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub parameters: Parameters,
    pub emc: Emc,
    #[serde(default)]
    pub engine: Engine,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    /// Edge length of the model, in voxels
    pub size: usize,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Emc {

    #[serde(default)]
    pub dimensions: Dimensions,

    /// Number of in-plane rotation angles (2-D only)
    pub num_rot: Option<usize>,

    /// Number of independent models. Only single-mode reconstruction exists.
    #[serde(default = "default_num_modes")]
    pub num_modes: usize,

    pub in_photons_file: PathBuf,

    /// Reciprocal-space coordinates of the detector pixels (3-D only)
    pub in_detector_file: Option<PathBuf>,

    /// Orientation sampling (3-D only)
    pub in_quaternion_file: Option<PathBuf>,

    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Allow for frame-to-frame variation of incident flux
    #[serde(default)]
    pub need_scaling: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dimensions {
    #[default]
    #[serde(rename = "2d")] Two,
    #[serde(rename = "3d")] Three,
}

/// Resource limits and numerical knobs of the iteration engine
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Engine {

    /// Orientations in flight at the same time, per process
    #[serde(default = "default_num_streams")]
    pub num_streams: usize,

    /// Fraction of free device memory that the probability matrix may occupy
    #[serde(default = "default_mem_thresh")]
    pub mem_thresh: f64,

    /// Memory of the device used by each process, e.g. `"4 GiB"`
    #[serde(default = "default_device_memory")]
    #[serde(deserialize_with = "deserialize_uom")]
    pub device_memory: Information,

    /// Floor applied to every normalized probability
    #[serde(default = "default_p_min")]
    pub p_min: f64,

    /// Seed for the random starting model
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            num_streams  : default_num_streams(),
            mem_thresh   : default_mem_thresh(),
            device_memory: default_device_memory(),
            p_min        : default_p_min(),
            seed         : None,
        }
    }
}

fn default_num_modes    () -> usize       { 1 }
fn default_num_streams  () -> usize       { 4 }
fn default_mem_thresh   () -> f64         { 0.8 }
fn default_p_min        () -> f64         { 1e-6 }
fn default_device_memory() -> Information { gibibytes(4.0) }
fn default_output_folder() -> PathBuf     { "data/".into() }
fn default_log_file     () -> PathBuf     { "EMC.log".into() }

impl Config {

    /// Reject parameter combinations which the engine cannot run
    pub fn validate(&self) -> Result<()> {
        let fail = |m: &str| Err(EmcError::config(m));
        let Config { parameters, emc, engine } = self;
        if parameters.size < 2 { return fail("model size must be at least 2") }
        if emc.num_modes != 1 {
            return Err(EmcError::config(format!("only single-mode reconstruction is implemented, got num_modes = {}", emc.num_modes)))
        }
        match emc.dimensions {
            Dimensions::Two => match emc.num_rot {
                None | Some(0) => return fail("2d reconstruction needs num_rot > 0"),
                Some(_) => {},
            },
            Dimensions::Three => {
                if emc.in_detector_file  .is_none() { return fail("3d reconstruction needs in_detector_file") }
                if emc.in_quaternion_file.is_none() { return fail("3d reconstruction needs in_quaternion_file") }
            },
        }
        if engine.num_streams == 0 { return fail("num_streams must be at least 1") }
        if !(engine.mem_thresh > 0.0 && engine.mem_thresh < 1.0) { return fail("mem_thresh must lie strictly between 0 and 1") }
        if !(engine.p_min >= 0.0 && engine.p_min < 1.0) { return fail("p_min must lie in [0, 1)") }
        Ok(())
    }

    /// Interpret relative paths as relative to `dir`
    fn resolve_paths(&mut self, dir: &Path) {
        let emc = &mut self.emc;
        let resolve = |p: &mut PathBuf| if p.is_relative() { *p = dir.join(&*p) };
        resolve(&mut emc.in_photons_file);
        resolve(&mut emc.output_folder);
        resolve(&mut emc.log_file);
        if let Some(p) = emc.in_detector_file  .as_mut() { resolve(p) }
        if let Some(p) = emc.in_quaternion_file.as_mut() { resolve(p) }
    }
}

/// Parse and validate the config file at `path`. Paths inside the file are
/// taken relative to the directory containing it.
pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| EmcError::config(format!("couldn't read config file `{}`: {e}", path.display())))?;
    let mut config: Config = toml::from_str(&text)?;
    config.resolve_paths(path.parent().unwrap_or(Path::new("")));
    config.validate()?;
    Ok(config)
}
