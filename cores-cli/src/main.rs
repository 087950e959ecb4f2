use clap::{Parser, Subcommand, ValueEnum};
use cores::db::MemoryDatabase;
use cores::schema::parse_layouts_str;
use cores::{Cores, CoresError, Document, Layout};
use serde_json::json;
use std::path::Path;
use std::process;
use std::sync::Arc;

/// Inspect cores layout definitions from the command line
#[derive(Parser)]
#[command(name = "cores", version, about)]
struct Cli {
    /// Layout definitions file (YAML or JSON)
    #[arg(long, default_value = "layouts.yaml")]
    layouts: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Check every layout definition and list the resulting designs
    Check,

    /// Print the design document generated for a layout
    Design {
        /// Layout name
        name: String,
    },

    /// Validate a JSON document against a layout's schema
    Validate {
        /// Layout name
        layout: String,
        /// Path to the document
        document: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("ERROR:{e}");
            process::exit(2);
        }
    }
}

/// Returns `false` when a document failed validation.
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let cores = load_layouts(Path::new(&cli.layouts))?;

    match cli.command {
        Command::Check => {
            let layouts: Vec<_> = cores
                .layout_names()
                .into_iter()
                .map(|name| -> Result<serde_json::Value, CoresError> {
                    let design = cores.layout(name).map(|h| h.design())?;
                    Ok(json!({
                        "name": name,
                        "design": design.id,
                        "views": design.views.keys().collect::<Vec<_>>(),
                    }))
                })
                .collect::<Result<_, _>>()?;
            print_output(&json!({ "ok": true, "layouts": layouts }), &cli.format)?;
        }

        Command::Design { name } => {
            let handle = cores.layout(&name)?;
            print_output(&handle.design().to_document()?.into_value(), &cli.format)?;
        }

        Command::Validate { layout, document } => {
            let handle = cores.layout(&layout)?;
            let content = std::fs::read_to_string(&document)
                .map_err(|e| format!("Failed to read document '{document}': {e}"))?;
            let mut doc = Document::from_value(serde_json::from_str(&content)?)?;
            if doc.get(&cores.config().type_field).is_none() {
                doc.set_type(&cores.config().type_field, handle.name());
            }

            match handle.validate(&doc) {
                Ok(()) => print_output(&json!({ "ok": true }), &cli.format)?,
                Err(CoresError::SchemaValidation { violations, .. }) => {
                    print_output(&json!({ "ok": false, "violations": violations }), &cli.format)?;
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(true)
}

/// Register every definition against an in-memory database. Nothing is
/// synced, so no server is needed.
fn load_layouts(path: &Path) -> Result<Cores, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read layouts file '{}': {e}", path.display()))?;
    let definitions = parse_layouts_str(&content)?;
    log::debug!("Loaded {} layout definitions", definitions.layouts.len());

    let mut cores = Cores::with_config(Arc::new(MemoryDatabase::new("cores")), definitions.config);
    for (name, config) in definitions.layouts {
        cores.register_layout(Layout::builder(name).config(config))?;
    }
    Ok(cores)
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
