//! Stencil CLI
//!
//! Usage:
//!   stencil [OPTIONS] <TEMPLATE>
//!
//! Options:
//!   -d, --dir <DIR>        Directory templates are loaded from
//!   -V, --vars <FILE>      JSON object with template variables
//!   -c, --config <FILE>    Engine configuration (TOML format)
//!   -v, --verbose          Log loading activity to stderr
//!   -h, --help             Print help

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stencil::{DirectorySource, EngineConfig, Registry, TemplateError, Value, Variables};

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Render text templates with inheritance")]
struct Cli {
    /// Template name, relative to the template directory
    template: String,

    /// Directory templates are loaded from
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// JSON file containing an object of template variables
    #[arg(short = 'V', long)]
    vars: Option<PathBuf>,

    /// Engine configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log loading activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let variables = match &cli.vars {
        Some(path) => match load_variables(path) {
            Ok(vars) => vars,
            Err(message) => {
                eprintln!("Error loading variables '{}': {}", path.display(), message);
                return ExitCode::FAILURE;
            }
        },
        None => Variables::new(),
    };

    let registry = Registry::with_config(DirectorySource::new(&cli.dir), config);
    match registry.render(&cli.template, variables).await {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&cli.dir, &e);
            ExitCode::FAILURE
        }
    }
}

/// Read a JSON object of variables
fn load_variables(path: &Path) -> Result<Variables, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    match serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())? {
        Value::Object(fields) => Ok(fields.into_iter().collect()),
        other => Err(format!("expected a JSON object, found {}", other.type_name())),
    }
}

/// Print an error, with source context when it is a compilation failure
fn report(dir: &Path, error: &TemplateError) {
    if let TemplateError::Parse { name, source } = error.root_cause() {
        if let Ok(text) = fs::read_to_string(dir.join(name)) {
            if !std::ptr::eq(error, error.root_cause()) {
                eprintln!("Error: {}", error);
            }
            eprint!("{}", source.format(&text, name));
            return;
        }
    }
    eprintln!("Error: {}", error);
}
