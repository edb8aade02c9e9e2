//! Multitone - SIS Mixer Harmonic Balance
//!
//! Solves for the junction voltages of a pumped SIS mixer described by a
//! TOML job file.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug multitone job.toml --tolerance 1e-8
//! ```

use std::path::PathBuf;

use clap::Parser;
use sis_multitone::{config::load_config, error::Result};

/// Harmonic-balance solver for SIS tunnel-junction mixers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the job description file (.toml)
    #[arg(value_name = "JOB_FILE")]
    job_file: PathBuf,

    /// Relative convergence tolerance (overrides the job file)
    #[arg(short, long)]
    tolerance: Option<f64>,

    /// Newton iteration cap (overrides the job file)
    #[arg(short = 'n', long)]
    max_iterations: Option<usize>,

    /// Normalised DC bias (overrides the job file)
    #[arg(short, long, allow_negative_numbers = true)]
    bias: Option<f64>,

    /// Log solver progress
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    // Parse the job file
    let mut job = load_config(&args.job_file)?;
    if let Some(tolerance) = args.tolerance {
        job.solver.tolerance = Some(tolerance);
    }
    if let Some(max_iterations) = args.max_iterations {
        job.solver.max_iterations = Some(max_iterations);
    }
    if let Some(bias) = args.bias {
        job.bias = bias;
    }

    // Build tones and unknowns
    let mut balance = job.build()?;

    // Solve
    let report = balance.run()?;

    println!("# tone harmonic  Re(Vn)        Im(Vn)        |Vn|          Re(Ip)        Im(Ip)");
    for tone in 0..balance.num_tones() {
        for harmonic in 1..=balance.tone(tone)?.num_harmonics() {
            let vn = balance.tone(tone)?.vn(harmonic)?;
            let ip = balance.current(tone, harmonic)?;
            println!(
                "{:>6} {:>8}  {:>12.6e}  {:>12.6e}  {:>12.6e}  {:>12.6e}  {:>12.6e}",
                tone,
                harmonic,
                vn.re,
                vn.im,
                vn.norm(),
                ip.re,
                ip.im
            );
        }
    }
    println!(
        "# iterations: {}  converged: {}  residual: {:.3e}",
        report.iterations, report.converged, report.residual
    );

    Ok(())
}
