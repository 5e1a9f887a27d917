//! cysacc command line
//!
//! ```bash
//! cysacc run --config run.toml
//! cysacc run --structure md.tpr --trajectory md.xtc --cysteines 10,5,42 --cutoff 1.2 --timeout 3600
//! cysacc analyze --config run.toml --plot
//! cysacc verify-labels --config run.toml --reference conf.pdb
//! ```
//!
//! Settings come from the TOML file given with `--config`; command-line
//! flags override individual values.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use cysacc::{
    analysis::Aggregator,
    figures::plot_combined_histograms,
    index::{check_structure_count, cysteine_order_from_structure, positional_labels, verify_label_order, IndexBuilder},
    tools::{dependency_install_instructions, find_compressor, find_distance_tool, find_make_ndx},
    Compression, JobRunner, ResidueId, RunConfig, ToolEnvironment,
};

/// Water accessibility of cysteine sulfur atoms along an MD trajectory
#[derive(Parser, Debug)]
#[command(name = "cysacc")]
#[command(version)]
#[command(about = "Minimum S-OW distances of cysteines over a GROMACS trajectory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// (Re)build the cysteine/water index file
    MakeIndex(CommonArgs),

    /// Compute the per-residue distance series
    Run(RunArgs),

    /// Analyse existing distance series
    Analyze(AnalyzeArgs),

    /// Compare positional group labels with a structure's cysteine order
    VerifyLabels(VerifyArgs),

    /// Check external tools
    Check(CommonArgs),

    /// Show version and build info
    Version,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Run configuration (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Top directory; results go to <topdir>/accessibility
    #[arg(long)]
    topdir: Option<PathBuf>,

    /// Structure / run input (tpr, gro, pdb)
    #[arg(long, short = 's')]
    structure: Option<PathBuf>,

    /// Trajectory (xtc, trr)
    #[arg(long, short = 'f')]
    trajectory: Option<PathBuf>,

    /// Cysteine resids, comma-separated (42 or Cys42)
    #[arg(long, value_delimiter = ',')]
    cysteines: Vec<String>,

    /// S-OW cutoff (nm)
    #[arg(long)]
    cutoff: Option<f64>,

    /// Result compression: gzip, bzip2, none
    #[arg(long)]
    compression: Option<Compression>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Per-residue time limit (seconds)
    #[arg(long)]
    timeout: Option<u64>,

    /// Fail when the index group count differs from the resid count
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Print the summary as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Also draw the combined histogram figure
    #[arg(long)]
    plot: bool,

    /// Number of histogram bins (default: 0.01 nm bins)
    #[arg(long)]
    bins: Option<usize>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// PDB or GRO file listing the cysteines in topology order
    #[arg(long)]
    reference: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeIndex(args) => make_index(args),
        Commands::Run(args) => run_jobs(args),
        Commands::Analyze(args) => analyze(args),
        Commands::VerifyLabels(args) => verify_labels(args),
        Commands::Check(args) => check_dependencies(args),
        Commands::Version => show_version(),
    }
}

/// Config file (if any) with command-line overrides applied.
fn load_config(args: &CommonArgs) -> Result<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::from_toml("")?,
    };

    if let Some(topdir) = &args.topdir {
        cfg.topdir = topdir.clone();
    }
    if let Some(structure) = &args.structure {
        cfg.structure = Some(structure.clone());
    }
    if let Some(trajectory) = &args.trajectory {
        cfg.trajectory = Some(trajectory.clone());
    }
    if !args.cysteines.is_empty() {
        cfg.cysteines = Some(
            args.cysteines
                .iter()
                .map(|s| match s.trim().parse::<i64>() {
                    Ok(n) => ResidueId::Int(n),
                    Err(_) => ResidueId::Text(s.clone()),
                })
                .collect(),
        );
    }
    if let Some(cutoff) = args.cutoff {
        cfg.cutoff = Some(cutoff);
    }
    if let Some(compression) = args.compression {
        cfg.compression = compression;
    }
    Ok(cfg)
}

fn make_index(args: CommonArgs) -> Result<()> {
    let cfg = load_config(&args)?;
    let acc = cfg.accessibility()?;
    let env = ToolEnvironment::discover(&cfg.tools, cfg.compression)?;

    IndexBuilder::new(&env, &acc)
        .with_selection(cfg.selection.clone())
        .build(cfg.structure()?, &acc.index_file())?;
    println!("Index written to {}", acc.index_file().display());
    Ok(())
}

fn run_jobs(args: RunArgs) -> Result<()> {
    let cfg = load_config(&args.common)?;
    let acc = cfg.accessibility()?;
    let env = ToolEnvironment::discover(&cfg.tools, cfg.compression)?;
    let timeout = args.timeout.or(cfg.timeout_secs).map(Duration::from_secs);

    log::info!("cysacc {}", cysacc::VERSION);
    log::info!("Residues: {:?}, cutoff {} nm", acc.cysteines(), acc.cutoff());

    let runner = JobRunner::new(acc, env, cfg.structure()?, cfg.trajectory()?)?
        .timeout(timeout)
        .strict_group_count(args.strict || cfg.strict_group_count)
        .selection(cfg.selection.clone())
        .extra_args(cfg.distance_args.clone());
    let report = runner.run()?;

    println!();
    println!("{:<10} {}", "Residue", "Status");
    for record in &report.records {
        println!("{:<10} {}", record.label(), record.outcome);
    }

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{} of {} residue jobs failed", failed, report.records.len());
    }
    if report.cancelled().next().is_some() {
        bail!("run was cancelled");
    }
    Ok(())
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let cfg = load_config(&args.common)?;
    let acc = cfg.accessibility()?;

    let results = Aggregator::new(&acc)
        .analyze()
        .context("Run `cysacc run` first to produce the distance files")?;
    let summaries = results.summaries();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!(
            "{:<10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "Residue", "frames", "min", "mean", "median", "std", "mode"
        );
        let fmt = |v: Option<f64>| v.map(|x| format!("{:.3}", x)).unwrap_or_else(|| "-".to_string());
        for s in &summaries {
            println!(
                "{:<10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
                s.label,
                s.frames,
                fmt(s.min),
                fmt(s.mean),
                fmt(s.median),
                fmt(s.std),
                fmt(s.mode)
            );
        }
    }

    results.write_summary_json(&acc.layout().summary_json())?;

    if args.plot {
        plot_combined_histograms(&acc.figure_path(), &results, args.bins)?;
    }
    Ok(())
}

fn verify_labels(args: VerifyArgs) -> Result<()> {
    let cfg = load_config(&args.common)?;
    let acc = cfg.accessibility()?;
    let reference = match &args.reference {
        Some(path) => path.clone(),
        None => cfg.structure()?.to_path_buf(),
    };

    let order = cysteine_order_from_structure(&reference, &cfg.selection.cysteine_resname)?;
    for binding in positional_labels(&order, acc.cysteines()) {
        println!(
            "resid {:>6} -> {}",
            binding.structure_resid,
            binding.label.as_deref().unwrap_or("(unlabelled)")
        );
    }

    check_structure_count(&reference, &order, acc.cysteines().len())?;
    let mislabels = verify_label_order(&order, acc.cysteines());
    if !mislabels.is_empty() {
        for m in &mislabels {
            log::error!("Cysteine {} would be labelled {}", m.structure_resid, m.assigned_label);
        }
        bail!("{} cysteine groups would be mislabelled", mislabels.len());
    }
    println!("Labels match the structure order.");
    Ok(())
}

fn check_dependencies(args: CommonArgs) -> Result<()> {
    let cfg = load_config(&args)?;

    println!("cysacc Dependency Check");
    println!("=======================");
    println!();

    let mut missing = Vec::new();

    print!("make_ndx:   ");
    match cfg.tools.make_ndx.clone().or_else(find_make_ndx) {
        Some(cmd) => println!("OK ({})", cmd),
        None => {
            println!("NOT FOUND");
            missing.push("make_ndx");
        }
    }

    print!("g_dist:     ");
    match cfg.tools.distance.clone().or_else(find_distance_tool) {
        Some(cmd) => println!("OK ({})", cmd),
        None => {
            println!("NOT FOUND");
            missing.push("g_dist");
        }
    }

    let filter = cfg.compression.default_filter().0;
    print!("compressor: ");
    match cfg.tools.compressor.clone().or_else(|| find_compressor(cfg.compression)) {
        Some(cmd) => println!("OK ({})", cmd),
        None => {
            println!("NOT FOUND ({})", filter);
            missing.push(filter);
        }
    }

    print!("bzip2 -dc:  ");
    match find_compressor(Compression::Bzip2) {
        Some(cmd) => println!("OK ({})", cmd.program.display()),
        None => println!("NOT FOUND (only needed to read .bz2 results)"),
    }

    println!();
    if missing.is_empty() {
        println!("All required tools available!");
    } else {
        missing.dedup();
        for tool in missing {
            println!("{}", dependency_install_instructions(tool));
        }
    }
    Ok(())
}

fn show_version() -> Result<()> {
    println!("cysacc {}", cysacc::VERSION);
    println!();
    println!("Build info:");
    println!("  Platform: {}-{}", std::env::consts::OS, std::env::consts::ARCH);
    Ok(())
}
