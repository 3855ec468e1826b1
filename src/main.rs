use clap::Parser;
use colored::Colorize;
use miette::{Result, WrapErr};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use testprune::analysis::{EntrypointSpec, Granularity, Seeding};
use testprune::config::Config;
use testprune::coverage::parse_coverage_file;
use testprune::discovery::FileFinder;
use testprune::graph::{ClasspathResolver, ParallelGraphBuilder};
use testprune::reducer::{Reducer, ReducerOptions};
use testprune::refactor::OutputLayout;
use testprune::report::{ReportFormat, Reporter};

/// testprune - reduce a Java codebase to what one test needs
#[derive(Parser, Debug)]
#[command(name = "testprune")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory; relative source roots and paths resolve against it
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Java source roots (can be specified multiple times)
    #[arg(short = 's', long = "source-root", value_name = "DIR")]
    source_root: Vec<PathBuf>,

    /// Class directories or jars the sources compile against
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,

    /// Entry test method, `pkg.Class#method` or `pkg.Class::method`
    #[arg(short, long)]
    entrypoint: Option<String>,

    /// Triggering test (can be specified multiple times); used without --entrypoint
    #[arg(long = "test", value_name = "METHOD")]
    tests: Vec<String>,

    /// JaCoCo XML report for coverage seeding
    #[arg(long, value_name = "FILE")]
    coverage: Option<PathBuf>,

    /// Unit of retention
    #[arg(long, value_enum)]
    granularity: Option<GranularityArg>,

    /// Where reachability starts
    #[arg(long, value_enum)]
    seeding: Option<SeedingArg>,

    /// Worker threads for reachability and decisions
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Treat `assert` statements as executed
    #[arg(long)]
    assertions: bool,

    /// Directory to write the reduced sources to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout (json format)
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Decide and report without writing any sources
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum GranularityArg {
    Class,
    Member,
}

impl From<GranularityArg> for Granularity {
    fn from(arg: GranularityArg) -> Self {
        match arg {
            GranularityArg::Class => Granularity::Class,
            GranularityArg::Member => Granularity::Member,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SeedingArg {
    Static,
    Coverage,
}

impl From<SeedingArg> for Seeding {
    fn from(arg: SeedingArg) -> Self {
        match arg {
            SeedingArg::Static => Seeding::Static,
            SeedingArg::Coverage => Seeding::Coverage,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    info!("testprune v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    run_reduction(&config, &cli)
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        // Try to load from default locations
        Config::from_default_locations(&cli.path)?
    };

    // Override with CLI arguments
    if !cli.source_root.is_empty() {
        config.source_roots = cli.source_root.clone();
    }
    if !cli.classpath.is_empty() {
        config.classpath = cli.classpath.clone();
    }
    if let Some(entrypoint) = &cli.entrypoint {
        config.entrypoint = Some(entrypoint.clone());
    }
    if !cli.tests.is_empty() {
        config.triggering_tests = cli.tests.clone();
    }
    if let Some(coverage) = &cli.coverage {
        config.coverage_report = Some(coverage.clone());
    }
    if let Some(granularity) = cli.granularity {
        config.reduction.granularity = granularity.into();
    }
    if let Some(seeding) = cli.seeding {
        config.reduction.seeding = seeding.into();
    }
    if let Some(parallelism) = cli.parallelism {
        config.reduction.parallelism = parallelism;
    }
    if cli.assertions {
        config.assertions_enabled = true;
    }
    if let Some(output) = &cli.output {
        config.output.root = Some(output.clone());
    }

    Ok(config)
}

fn run_reduction(config: &Config, cli: &Cli) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let spec = EntrypointSpec::from_config(config)?;

    // Step 1: Discover files
    info!("Discovering files...");
    let files = FileFinder::new(config).find_files(&cli.path)?;
    info!("Found {} Java files", files.len());
    if files.is_empty() {
        println!("{}", "No Java files found.".yellow());
        return Ok(());
    }

    // Step 2: Parse files and build the source context
    let classpath: Vec<PathBuf> = config.classpath.iter().map(|p| cli.path.join(p)).collect();
    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(files.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let context = ParallelGraphBuilder::new()
        .with_classpath(ClasspathResolver::from_entries(&classpath))
        .with_progress(pb)
        .build_from_files(&files)?;

    // Step 3: Coverage, when seeding from it
    let options = ReducerOptions::from_config(config);
    let coverage = match (&config.coverage_report, options.seeding) {
        (Some(path), Seeding::Coverage) => {
            let path = cli.path.join(path);
            Some(parse_coverage_file(&path).wrap_err("Failed to load coverage report")?)
        }
        (Some(_), Seeding::Static) => {
            warn!("Coverage report given without --seeding coverage; ignoring it");
            None
        }
        _ => None,
    };

    // Step 4: Reduce
    let roots = source_roots(config, &cli.path);
    let reducer = Reducer::new(&context, options).with_source_roots(roots.clone());
    let reduction = reducer.reduce(&spec, coverage.as_ref())?;

    // Step 5: Report
    let format = cli
        .format
        .map(ReportFormat::from)
        .or_else(|| ReportFormat::from_name(&config.output.format))
        .unwrap_or_default();
    Reporter::new(format, cli.report.clone()).report(&reduction, &context)?;

    // Step 6: Write
    if cli.dry_run {
        println!("{}", "Dry run: no sources written.".yellow());
        return Ok(());
    }
    let Some(output) = &config.output.root else {
        println!("{}", "No output directory given (--output); nothing written.".yellow());
        return Ok(());
    };
    let layout = output_layout(&roots, &cli.path, &cli.path.join(output));
    let written = reduction.write(&layout)?;
    println!(
        "{}",
        format!("Wrote {} reduced files to {}", written.len(), output.display()).green()
    );

    Ok(())
}

fn source_roots(config: &Config, base: &Path) -> Vec<PathBuf> {
    if config.source_roots.is_empty() {
        vec![base.to_path_buf()]
    } else {
        config.source_roots.iter().map(|r| base.join(r)).collect()
    }
}

/// One root maps straight onto the output directory; several roots keep
/// their paths relative to the project beneath it
fn output_layout(roots: &[PathBuf], base: &Path, output: &Path) -> OutputLayout {
    if let [root] = roots {
        return OutputLayout::single(root.clone(), output.to_path_buf());
    }
    roots.iter().fold(OutputLayout::new(), |layout, root| {
        let relative = match root.strip_prefix(base) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => root.file_name().map(PathBuf::from).unwrap_or_default(),
        };
        layout.with_root(root.clone(), output.join(relative))
    })
}
