//! Command-line host for dynio drivers.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dynio_core::{DriverHandle, DriverLoader, LoaderConfig};
use dynio_csv::Csv;

/// dynio - load I/O drivers at runtime.
#[derive(Parser, Debug)]
#[command(name = "dynio")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Loader configuration file (.toml or .json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to search for driver modules. May be repeated.
    #[arg(short = 'L', long = "search-path", global = true)]
    search_paths: Vec<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load a driver and show its name and options.
    Inspect {
        /// Driver name or module path.
        driver: String,
        /// Option to show. May be repeated.
        #[arg(short, long = "option")]
        options: Vec<String>,
    },
    /// List driver modules found in the search paths.
    List,
    /// Convert between CSV and JSON with a csv driver.
    Csv {
        #[command(subcommand)]
        csv_cmd: CsvCommand,
    },
}

/// CSV subcommands.
#[derive(Subcommand, Debug)]
enum CsvCommand {
    /// Decode a CSV file and print the table as JSON.
    Decode {
        /// Driver name or module path.
        driver: String,
        /// CSV file to decode.
        file: PathBuf,
        /// Field delimiter.
        #[arg(short, long)]
        delimiter: Option<char>,
    },
    /// Encode a JSON table as CSV.
    Encode {
        /// Driver name or module path.
        driver: String,
        /// JSON file with `header` and `rows`.
        input: PathBuf,
        /// Field delimiter.
        #[arg(short, long)]
        delimiter: Option<char>,
        /// Output file (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let loader = build_loader(args.config.as_deref(), &args.search_paths)?;

    let result = match args.command {
        Command::Inspect { driver, options } => inspect(&loader, &driver, &options),
        Command::List => list(&loader),
        Command::Csv { csv_cmd } => run_csv_cmd(&loader, csv_cmd),
    };

    dynio_core::registry::shutdown();
    result
}

fn init_logging(verbose: bool) {
    // Check if JSON logging is requested (for production/container environments)
    let json_logging = std::env::var("DYNIO_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "dynio=debug" } else { "dynio=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so command output can be piped.
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Build a loader from the config file, the environment and `--search-path`.
fn build_loader(config: Option<&Path>, search_paths: &[PathBuf]) -> Result<DriverLoader> {
    let config = match config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to read loader config {}", path.display()))?,
        None => LoaderConfig::default(),
    };

    let mut config = config.with_env_overrides();
    // Command-line directories are searched first.
    config.search_paths.splice(0..0, search_paths.iter().cloned());

    tracing::debug!(
        search_paths = ?config.search_paths,
        share_modules = config.share_modules,
        "Loader configured"
    );
    Ok(DriverLoader::with_config(config))
}

/// Whether a driver argument names a file rather than a driver.
fn is_path_argument(driver: &str) -> bool {
    driver.contains(std::path::is_separator) || Path::new(driver).exists()
}

fn open_driver(loader: &DriverLoader, driver: &str) -> Result<DriverHandle> {
    if is_path_argument(driver) {
        loader
            .load(driver)
            .with_context(|| format!("Failed to load driver module {}", driver))
    } else {
        loader
            .load_by_name(driver)
            .with_context(|| format!("Failed to load driver `{}`", driver))
    }
}

fn open_csv(
    loader: &DriverLoader,
    driver: &str,
    delimiter: Option<char>,
) -> Result<DriverHandle<Csv>> {
    let handle = open_driver(loader, driver)?;
    if handle.name() != "csv" {
        bail!(
            "driver `{}` from {} is not a csv driver",
            handle.name(),
            handle.module_path().display()
        );
    }

    // SAFETY: drivers named `csv` decode into `dynio_csv::Csv`.
    let mut csv = unsafe { handle.narrow::<Csv>() };
    if let Some(delimiter) = delimiter {
        csv.option(dynio_csv::DELIMITER)
            .context("csv driver has no delimiter option")?
            .set_char(delimiter)?;
    }
    Ok(csv)
}

fn inspect(loader: &DriverLoader, driver: &str, options: &[String]) -> Result<()> {
    let mut handle = open_driver(loader, driver)?;

    println!("Driver: {}", handle.name());
    println!("Module: {}", handle.module_path().display());

    for name in options {
        match handle.option(name) {
            Some(option) => {
                let value = match option.value() {
                    Ok(value) => value.to_string(),
                    Err(e) => format!("<{}>", e),
                };
                println!("  {} ({}) = {}", name, option.kind(), value);
            }
            None => println!("  {}: not found", name),
        }
    }
    Ok(())
}

fn list(loader: &DriverLoader) -> Result<()> {
    let modules = loader.discover();
    if modules.is_empty() {
        println!("No driver modules found in {:?}", loader.config().search_paths);
        return Ok(());
    }

    for path in modules {
        println!("{}", path.display());
    }
    Ok(())
}

fn run_csv_cmd(loader: &DriverLoader, cmd: CsvCommand) -> Result<()> {
    match cmd {
        CsvCommand::Decode {
            driver,
            file,
            delimiter,
        } => {
            let input = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut csv = open_csv(loader, &driver, delimiter)?;
            let table = csv
                .read(&input)
                .with_context(|| format!("Failed to decode {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
        CsvCommand::Encode {
            driver,
            input,
            delimiter,
            output,
        } => {
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let table: Csv = serde_json::from_str(&json)
                .with_context(|| format!("{} is not a CSV table", input.display()))?;

            let mut csv = open_csv(loader, &driver, delimiter)?;
            let bytes = csv.write(&table).context("Failed to encode table")?;

            match output {
                Some(path) => std::fs::write(&path, &bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
    }
    Ok(())
}
