//! Command-line front end for building snow aggregates.
//!
//! Argument parsing and logging setup live here; the build pipeline and
//! file output are in [`run`].

mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "snowagg")]
#[command(about = "Build 3-D snow aggregates from ice crystal monomers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build one aggregate, optionally rime it, and write its lattice rows
    Build(BuildArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Shape {
    Plate,
    Column,
    Spheroid,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Psd {
    /// Every monomer has the same size
    Mono,
    /// Truncated exponential sizes
    Exp,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Monomer crystal shape
    #[arg(long, value_enum, default_value_t = Shape::Plate)]
    pub shape: Shape,
    /// Override the shape's aspect ratio (height / diameter)
    #[arg(long)]
    pub aspect: Option<f64>,
    /// Monomer maximum dimension, or the mean for `--psd exp` (m)
    #[arg(long, default_value_t = 1e-3)]
    pub size: f64,
    /// Monomer size distribution
    #[arg(long, value_enum, default_value_t = Psd::Mono)]
    pub psd: Psd,
    /// Smallest monomer size for `--psd exp` (m)
    #[arg(long, default_value_t = 0.1e-3)]
    pub min_size: f64,
    /// Largest monomer size for `--psd exp` (m)
    #[arg(long, default_value_t = 3e-3)]
    pub max_size: f64,
    /// Number of monomers
    #[arg(short = 'n', long, default_value_t = 5)]
    pub monomers: usize,
    /// Element diameter and lattice spacing (m)
    #[arg(long, default_value_t = 40e-6)]
    pub grid_res: f64,
    /// Random seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Number of rime spheres to deposit after the build
    #[arg(long, default_value_t = 0)]
    pub rime: usize,
    /// Rime compaction budget, in element diameters (0 disables)
    #[arg(long, default_value_t = 0.0)]
    pub compact_dist: f64,
    /// Keep merges uniformly oriented instead of aligning them
    #[arg(long)]
    pub no_align: bool,
    /// Path of the lattice rows file; metadata goes to `<output>.meta.json`
    #[arg(short, long)]
    pub output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    match cli.command {
        Commands::Build(args) => run::build(&args),
    }
}
