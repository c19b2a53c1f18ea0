use std::{
    fs::File,
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use cache_sim::{
    cache::Summary,
    config::Geometry,
    sim::{SimError, Simulator},
    trace::{Trace, TraceError},
};
use clap::Parser;
use serde::Serialize;

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

/// Replays a valgrind memory trace against a set-associative LRU cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of set index bits (2^s sets)
    #[arg(short = 's', value_name = "s")]
    set_bits: u32,
    /// Number of lines per set
    #[arg(short = 'E', value_name = "E")]
    associativity: usize,
    /// Number of block bits (2^b bytes per block)
    #[arg(short = 'b', value_name = "b")]
    block_bits: u32,
    /// File path to input trace
    #[arg(short = 't', value_name = "tracefile")]
    trace: PathBuf,
    /// Print every record with its outcome
    #[arg(short, long)]
    verbose: bool,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    geometry: &'a Geometry,
    #[serde(flatten)]
    summary: Summary,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = e.downcast_ref::<SimError>().map_or(1, SimError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Cli) -> Result<()> {
    let geometry = Geometry::new(args.set_bits, args.associativity, args.block_bits);
    geometry.validate_positive().map_err(SimError::from)?;
    let trace = read_trace(&args.trace)?;
    let mut sim = Simulator::new(geometry).map_err(SimError::from)?;
    let summary = if args.verbose {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        sim.run_with(trace, |record, outcome| {
            if !outcome.is_skipped() {
                writeln!(out, "{record} {outcome}")?;
            }
            Ok(())
        })?
    } else {
        sim.run(trace)
    };
    output_stat(&sim);
    if args.json {
        let report = Report {
            geometry: &geometry,
            summary,
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}

fn read_trace(path: &Path) -> Result<Trace> {
    let file = File::open(path)
        .map_err(|e| SimError::from(TraceError::from(e)))
        .with_context(|| format!("cannot open trace {}", path.display()))?;
    let trace = Trace::from_reader(BufReader::new(file))
        .map_err(SimError::from)
        .with_context(|| format!("cannot read trace {}", path.display()))?;
    Ok(trace)
}

#[cfg(not(feature = "stat"))]
fn output_stat(_: &Simulator) {}

#[cfg(feature = "stat")]
fn output_stat(sim: &Simulator) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
