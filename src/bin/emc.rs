// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "emc", about = "Reconstruct a model from sparse diffraction frames by Expectation Maximization Compression")]
pub struct Cli {

    /// Number of iterations to perform
    pub num_iter: usize,

    /// Configuration file
    #[clap(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Concurrent streams per process [default: from config file]
    #[clap(short, long)]
    pub streams: Option<usize>,

    /// Number of cooperating processes, each owning a share of the orientations
    #[clap(short, long, default_value = "1")]
    pub processes: usize,
}

// --------------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn Error>> {

    let Cli { num_iter, config, streams, processes } = Cli::parse();
    if processes == 0 { return Err("need at least one process".into()) }

    let mut progress = Progress::new();
    progress.start("Reading configuration");
    let config = read_config_file(&config)?;
    let mut settings = Settings::from(&config);
    if let Some(streams) = streams { settings.num_streams = streams.max(1) }
    progress.done();

    let size = config.parameters.size;
    match config.emc.dimensions {
        Dimensions::Two => {
            let num_rot = config.emc.num_rot.ok_or("2d reconstruction needs num_rot")?;
            let kernel = InPlane::new(size);
            let table = OrientationTable::in_plane(num_rot);
            reconstruct(&kernel, &table, &config, settings, num_iter, processes, &mut progress)
        }
        Dimensions::Three => {
            let detector = config.emc.in_detector_file.as_ref().ok_or("3d reconstruction needs in_detector_file")?;
            let quaternions = config.emc.in_quaternion_file.as_ref().ok_or("3d reconstruction needs in_quaternion_file")?;
            progress.start("Reading detector and orientations");
            let kernel = Volume::new(size, io::hdf5::read_detector(detector)?);
            let table = OrientationTable::from_quaternions(&io::hdf5::read_quaternions(quaternions)?)?;
            progress.done_with_message(&format!("{} pixels, {} orientations", g(kernel.num_pix()), g(table.len())));
            reconstruct(&kernel, &table, &config, settings, num_iter, processes, &mut progress)
        }
    }
}

fn reconstruct<K: CompatKernel>(
    kernel   : &K,
    table    : &OrientationTable<K::Orientation>,
    config   : &Config,
    settings : Settings,
    num_iter : usize,
    processes: usize,
    progress : &mut Progress,
) -> Result<(), Box<dyn Error>> {

    progress.start("Reading photons");
    let frames = io::hdf5::read_photons(&config.emc.in_photons_file, kernel.num_pix())?;
    progress.done_with_message(&format!("{} frames, {:.2} photons per frame", g(frames.num_data()), frames.mean_count()));

    let outputs = Outputs {
        folder: &config.emc.output_folder,
        log_file: &config.emc.log_file,
    };

    if processes == 1 {
        let emc = Emc::new(kernel, &frames, table, settings, Solo)?;
        run(emc, table, num_iter, &outputs)?;
    } else {
        // Each process gets its own thread, and its own share of the orientations
        let frames = &frames;
        let outputs = &outputs;
        let results: Vec<_> = std::thread::scope(|s| {
            let members: Vec<_> = LocalGroup::new(processes).into_iter()
                .map(|group| s.spawn(move || {
                    Emc::new(kernel, frames, table, settings, group)
                        .and_then(|emc| run(emc, table, num_iter, outputs))
                }))
                .collect();
            members.into_iter()
                .map(|m| m.join().unwrap_or_else(|_| Err(EmcError::collective("a process panicked"))))
                .collect()
        });
        for result in results { result? }
    }
    Ok(())
}

struct Outputs<'a> {
    folder: &'a Path,
    log_file: &'a Path,
}

/// Perform `num_iter` iterations. The root reports on each, and saves the
/// model and orientations after each. A failure to write stops every member.
fn run<K: CompatKernel, G: GroupChannel>(
    mut emc : Emc<K, G>,
    table   : &OrientationTable<K::Orientation>,
    num_iter: usize,
    outputs : &Outputs,
) -> emc::Result<()> {
    let root = emc.is_root();
    let opened = if root { open_log(outputs.log_file).map(Some) } else { Ok(None) };
    let mut log = agree_on_outcome(emc.group(), opened)?;

    let mut durations = vec![];
    for _ in 0..num_iter {
        let report = emc.run_iteration()?;
        durations.push(report.duration.as_secs_f64());
        let saved = match log.as_mut() {
            Some(log) => save_iteration(log, &report, &emc, table, outputs),
            None => Ok(()),
        };
        agree_on_outcome(emc.group(), saved)?;
    }

    // The first iteration includes warm-up costs
    if root && durations.len() > 1 {
        let later = &durations[1..];
        println!("{:.3} s/iteration", later.iter().sum::<f64>() / later.len() as f64);
    }
    Ok(())
}

fn open_log(path: &Path) -> std::io::Result<File> {
    let mut log = OpenOptions::new().create(true).append(true).open(path)?;
    println!("\n{}", IterationReport::HEADER);
    writeln!(log, "{}", IterationReport::HEADER)?;
    Ok(log)
}

fn save_iteration<K: CompatKernel, G: GroupChannel>(
    log    : &mut File,
    report : &IterationReport,
    emc    : &Emc<K, G>,
    table  : &OrientationTable<K::Orientation>,
    outputs: &Outputs,
) -> std::io::Result<()> {
    println!("{report}");
    writeln!(log, "{report}")?;
    let degrees = emc.assignment().degrees(table);
    io::raw::write_iteration(outputs.folder, Some(report.iteration), &emc.model().data, Some(&degrees))?;
    Ok(())
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;

use emc::{
    CompatKernel, Emc, EmcError, GroupChannel, InPlane, IterationReport, LocalGroup,
    OrientationTable, Settings, Solo, Volume,
    config::{Config, Dimensions, read_config_file},
    group::agree_on_outcome,
    io,
    utils::{group_digits as g, timing::Progress},
};
