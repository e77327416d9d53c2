//! JSON:API Mapper CLI
//!
//! Command-line interface for rendering backend objects as JSON:API documents,
//! parsing documents back onto objects and describing message types.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jsonapi_mapper::{
    load_json, load_registry_auto, parse_document, read_file, render, update_object, Document,
    ErrorFragment, ObjectRef, Registry, Responder, ResponderConfig, Response,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsonapi-mapper")]
#[command(about = "Map JSON backend objects to and from JSON:API documents")]
#[command(version)]
struct Cli {
    /// Log mapping steps to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a backend object (or array of objects) as a document
    Render {
        /// JSON file holding the backend object(s)
        object: PathBuf,

        /// Type definitions: file path or URL (http:// or https://)
        #[arg(long, short)]
        schema: String,

        /// Message type to map the object(s) with
        #[arg(long = "type", short = 't')]
        message_type: String,

        /// Add included resources
        #[arg(long)]
        include: bool,

        /// Embed nested relationships
        #[arg(long)]
        nest: bool,

        /// Responder config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Parse a document and apply it to a target object
    Parse {
        /// JSON:API document file
        document: PathBuf,

        /// Type definitions: file path or URL (http:// or https://)
        #[arg(long, short)]
        schema: String,

        /// Message type of the primary data
        #[arg(long = "type", short = 't')]
        message_type: String,

        /// Backend object to update (prints the parsed message if omitted)
        #[arg(long)]
        target: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Describe message types for client code generation
    Describe {
        /// Type definitions: file path or URL (http:// or https://)
        #[arg(long, short)]
        schema: String,

        /// Types to describe (all if omitted)
        #[arg(long = "type", short = 't')]
        message_types: Vec<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Render {
            object,
            schema,
            message_type,
            include,
            nest,
            config,
            output,
            pretty,
        } => run_render(RenderArgs {
            object,
            schema,
            message_type,
            include,
            nest,
            config,
            output,
            pretty,
        }),

        Commands::Parse {
            document,
            schema,
            message_type,
            target,
            output,
            pretty,
        } => run_parse(&document, &schema, &message_type, target, output, pretty),

        Commands::Describe {
            schema,
            message_types,
            pretty,
        } => run_describe(&schema, &message_types, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Logs go to stderr so stdout stays pure JSON.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_definitions(source: &str) -> Result<Arc<Registry>, u8> {
    load_registry_auto(source).map(Arc::new).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

struct RenderArgs {
    object: PathBuf,
    schema: String,
    message_type: String,
    include: bool,
    nest: bool,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    pretty: bool,
}

fn run_render(args: RenderArgs) -> Result<(), u8> {
    let RenderArgs {
        object,
        schema,
        message_type,
        include,
        nest,
        config,
        output,
        pretty,
    } = args;
    let registry = load_definitions(&schema)?;

    let mut config = match config {
        Some(path) => {
            let value = load_json(&path).map_err(|e| {
                eprintln!("Error: loading config: {}", e);
                e.exit_code() as u8
            })?;
            serde_json::from_value::<ResponderConfig>(value).map_err(|e| {
                eprintln!("Error: invalid config {}: {}", path.display(), e);
                2u8
            })?
        }
        None => ResponderConfig::default(),
    };
    config.include_relationships |= include;
    config.nesting |= nest;

    let data = load_json(&object).map_err(|e| {
        eprintln!("Error: loading object: {}", e);
        e.exit_code() as u8
    })?;
    let response = match data {
        Value::Array(items) => Response::many(
            items.into_iter().map(|item| Arc::new(item) as ObjectRef).collect(),
            message_type,
        ),
        item => Response::one(Arc::new(item), message_type),
    };

    let responder = Responder::new(registry, config);
    let reply = responder.respond(|| Ok::<_, jsonapi_mapper::MappingError>(Some(response)));
    let body = reply.body.unwrap_or(Value::Null);
    write_output(&body, output, pretty)?;

    if reply.status >= 400 {
        Err(1)
    } else {
        Ok(())
    }
}

fn run_parse(
    document: &Path,
    schema: &str,
    message_type: &str,
    target: Option<PathBuf>,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let registry = load_definitions(schema)?;
    let raw = read_file(document).map_err(|e| {
        eprintln!("Error: loading document: {}", e);
        e.exit_code() as u8
    })?;

    let message = match parse_document(&registry, &raw, message_type) {
        Ok(message) => message,
        Err(e) => {
            let fragment = ErrorFragment::from_error(&e);
            let body = Document::with_errors(vec![fragment]).to_value();
            write_output(&body, output, pretty)?;
            return Err(e.exit_code() as u8);
        }
    };

    let result = match (message, target) {
        (None, _) => Ok(Value::Null),
        (Some(message), Some(target)) => {
            let object = load_json(&target).map_err(|e| {
                eprintln!("Error: loading target: {}", e);
                e.exit_code() as u8
            })?;
            update_object(&message, object)
        }
        (Some(message), None) => render(&registry, &message, true).map(|data| {
            json!({
                "data": data,
                "meta": { "updated": message.updated_fields() },
            })
        }),
    };

    match result {
        Ok(body) => write_output(&body, output, pretty),
        Err(e) => {
            let body = Document::with_errors(vec![ErrorFragment::from_error(&e)]).to_value();
            write_output(&body, output, pretty)?;
            Err(e.exit_code() as u8)
        }
    }
}

fn run_describe(schema: &str, message_types: &[String], pretty: bool) -> Result<(), u8> {
    let registry = load_definitions(schema)?;
    let responder = Responder::new(registry, ResponderConfig::default());
    let reply = responder.describe(message_types);
    let body = reply.body.unwrap_or(Value::Null);
    write_output(&body, None, pretty)?;

    if reply.status >= 400 {
        Err(1)
    } else {
        Ok(())
    }
}

fn write_output(body: &Value, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(body)
    } else {
        serde_json::to_string(body)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}
