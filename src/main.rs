//! Stack Render CLI
//!
//! Usage:
//!   stack-render [OPTIONS] [TEMPLATE]
//!
//! Options:
//!   -p, --param <KEY=VALUE>   Parameter value (repeatable)
//!   --params-file <FILE>      YAML or JSON mapping of parameter values
//!   -c, --config <FILE>       Render configuration (TOML format)
//!   --region <REGION>         Override the configured region
//!   -f, --format <FORMAT>     Output format: json or yaml
//!   --expect <NAME>           Fail unless the named resource is rendered
//!   -v, --verbose             Increase log verbosity
//!   -h, --help                Print help

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use stack_render::template::load_values;
use stack_render::{render_with_config, Parameters, RenderConfig, RenderError, Template, Value};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Parser)]
#[command(name = "stack-render")]
#[command(about = "Render infrastructure templates into concrete resource documents")]
struct Cli {
    /// Template file (reads from stdin if not provided)
    template: Option<PathBuf>,

    /// Parameter value as KEY=VALUE
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// YAML or JSON mapping of parameter values
    #[arg(long)]
    params_file: Option<PathBuf>,

    /// Render configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured region
    #[arg(long)]
    region: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Fail unless the named resource is present in the rendered document
    #[arg(long, value_name = "NAME")]
    expect: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => match RenderConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => fail(format!("loading config '{}': {}", path.display(), e)),
        },
        None => RenderConfig::default(),
    };
    if let Some(region) = &cli.region {
        config = config.with_region(region);
    }

    // Collect parameters; command-line values win over the params file
    let mut params = Parameters::new();
    if let Some(path) = &cli.params_file {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => fail(format!("reading params file '{}': {}", path.display(), e)),
        };
        match load_values(&content) {
            Ok(values) => params.extend(values),
            Err(e) => fail(e.format(&content, &path.display().to_string())),
        }
    }
    for (key, value) in &cli.params {
        params.insert(key.clone(), Value::string(value));
    }

    // Read template
    let (source, filename) = match &cli.template {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => (content, path.display().to_string()),
            Err(e) => fail(format!("reading file '{}': {}", path.display(), e)),
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => (buffer, "<stdin>".to_string()),
                Err(e) => fail(format!("reading from stdin: {}", e)),
            }
        }
    };

    let template = match Template::from_str(&source) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", e.format(&source, &filename));
            std::process::exit(1);
        }
    };

    let document = match render_with_config(&template, &params, &config) {
        Ok(document) => document,
        Err(RenderError::Parse(e)) => {
            eprintln!("{}", e.format(&source, &filename));
            std::process::exit(1);
        }
        Err(e) => fail(e),
    };

    let missing: Vec<&str> = cli
        .expect
        .iter()
        .map(String::as_str)
        .filter(|name| !document.contains_resource(name))
        .collect();
    if !missing.is_empty() {
        fail(format!("expected resources not rendered: {}", missing.join(", ")));
    }

    let output = match cli.format {
        Format::Json => document.to_json().map_err(|e| e.to_string()),
        Format::Yaml => document.to_yaml().map_err(|e| e.to_string()),
    };
    match output {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => fail(format!("serializing document: {}", e)),
    }
}
