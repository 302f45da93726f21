//! SpecQL action compiler CLI.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

use specql_compiler::codegen::mutation_result_type;
use specql_compiler::{Compiler, CompilerConfig};

mod ui;

/// Default config file, looked up in the working directory.
const CONFIG_FILE: &str = "specql.yaml";

#[derive(Parser)]
#[command(name = "specql")]
#[command(about = "SpecQL compiler - compiles entity actions to PL/pgSQL functions")]
#[command(version)]
struct Cli {
    /// Log compiler internals (overridden by SPECQL_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every action into a PL/pgSQL function file
    Compile {
        /// Directory of entity YAML files
        #[arg(short, long)]
        domain: Option<PathBuf>,

        /// Output directory for generated SQL
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file (defaults to ./specql.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate every action without generating code
    Check {
        /// Directory of entity YAML files
        #[arg(short, long)]
        domain: Option<PathBuf>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,

        /// Config file (defaults to ./specql.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the mutation result type DDL
    Types {
        /// Config file (defaults to ./specql.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Compile {
            domain,
            output,
            config,
        } => {
            let config = load_config(config.as_deref(), domain, output)?;
            compile(config)
        }
        Commands::Check {
            domain,
            json,
            config,
        } => {
            let config = load_config(config.as_deref(), domain, None)?;
            check(config, json)
        }
        Commands::Types { config } => {
            let config = load_config(config.as_deref(), None, None)?;
            print!("{}", mutation_result_type(&config.result_type));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("SPECQL_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file first, then command-line overrides.
fn load_config(
    path: Option<&Path>,
    domain: Option<PathBuf>,
    output: Option<PathBuf>,
) -> miette::Result<CompilerConfig> {
    let mut config = match path {
        Some(path) => CompilerConfig::load(path)?,
        None if Path::new(CONFIG_FILE).is_file() => CompilerConfig::load(Path::new(CONFIG_FILE))?,
        None => CompilerConfig::default(),
    };
    if let Some(domain) = domain {
        config.domain_dir = domain;
    }
    if let Some(output) = output {
        config.out_dir = output;
    }
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn compile(config: CompilerConfig) -> miette::Result<()> {
    ui::header(env!("CARGO_PKG_VERSION"));
    let start = Instant::now();
    let out_dir = config.out_dir.clone();

    let spinner = ui::spinner("Compiling actions...");
    let result = Compiler::new(config).compile();
    spinner.finish_and_clear();

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            ui::nope_header();
            return Err(e.into());
        }
    };

    for warning in &result.warnings {
        ui::warning(&warning.to_string());
    }
    ui::success(&format!(
        "{} from {}",
        ui::plural(result.functions, "function"),
        ui::plural(result.entities, "entity")
    ));
    ui::dim(&format!("written to {}", out_dir.display()));
    ui::timing("Done", start.elapsed().as_millis());
    Ok(())
}

fn check(config: CompilerConfig, json: bool) -> miette::Result<()> {
    let reports = if json {
        Compiler::new(config).check()?
    } else {
        let spinner = ui::spinner("Checking actions...");
        let reports = Compiler::new(config).check();
        spinner.finish_and_clear();
        reports?
    };
    let failed = reports.iter().filter(|r| !r.report.is_valid()).count();

    if json {
        let summaries: IndexMap<String, _> = reports
            .iter()
            .map(|r| (format!("{}.{}", r.entity, r.action), r.report.summary()))
            .collect();
        let text = serde_json::to_string_pretty(&summaries)
            .map_err(|e| miette::miette!("Failed to serialize reports: {}", e))?;
        println!("{}", text);
    } else {
        for r in &reports {
            let name = format!("{}.{}", r.entity, r.action);
            ui::report_line(&name, r.report.errors.len(), r.report.warnings.len());
            for error in &r.report.errors {
                ui::error(&format!("    {}", error));
            }
            for warning in &r.report.warnings {
                ui::warning(&format!("    {}", warning.message));
            }
        }
        println!();
        if failed == 0 {
            ui::looking_good();
        } else {
            ui::nope_header();
            ui::info(&format!("{} with errors", ui::plural(failed, "action")));
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
