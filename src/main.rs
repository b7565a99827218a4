use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sqlgate::compiler::{Args, CompiledSchema, FieldOwner};
use sqlgate::config::Config;
use sqlgate::schema::{extract_sdl, normalize};
use sqlgate::{ArgValue, Error, Result};

/// sqlgate - compile schema-attached query templates and inspect the result
#[derive(Parser, Debug)]
#[command(name = "sqlgate")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug  Override the log filter (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.sqlgate/sqlgate.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the operation set and join tables of a schema as JSON
    Inspect {
        /// GraphQL SDL file
        schema: PathBuf,

        /// Fill undeclared mutation return shapes from their templates
        #[arg(long)]
        infer_shapes: bool,
    },

    /// Compile one field's template with the given arguments
    Render {
        /// GraphQL SDL file
        schema: PathBuf,

        /// Field name, optionally qualified as `Type.field`
        field: String,

        /// Argument values as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Inspect {
            schema,
            infer_shapes,
        } => run_inspect(&schema, infer_shapes, &config),
        Command::Render {
            schema,
            field,
            args,
        } => run_render(&schema, &field, &args, &config),
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "sqlgate=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_schema(path: &Path, infer_shapes: bool, config: &Config) -> Result<CompiledSchema> {
    debug!(path = %path.display(), "loading schema");
    let mut metadata = extract_sdl(&fs::read_to_string(path)?)?;
    if infer_shapes {
        let inferred = normalize::infer_return_shapes(&mut metadata);
        info!(inferred, "return shapes inferred");
    }
    CompiledSchema::from_metadata(metadata, config)
}

fn run_inspect(path: &Path, infer_shapes: bool, config: &Config) -> Result<()> {
    let schema = load_schema(path, infer_shapes, config)?;
    let join_tables: serde_json::Map<String, serde_json::Value> = schema
        .compiler
        .join_tables()
        .iter()
        .map(|(logical, physical)| (logical.to_string(), json!(physical)))
        .collect();
    let output = json!({
        "operations": schema.operations.operations,
        "joinTables": join_tables,
        "crudTypes": schema
            .metadata
            .crud_types()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_render(path: &Path, field: &str, args: &str, config: &Config) -> Result<()> {
    let schema = load_schema(path, false, config)?;
    let op = find_operation(&schema, field)?;
    let args = parse_args(args)?;
    let compiled = op.render(&args)?;
    let output = json!({
        "field": format!("{}.{}", op.owner, op.field),
        "task": op.task,
        "kind": compiled.kind.to_string(),
        "query": compiled.query,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn find_operation<'a>(
    schema: &'a CompiledSchema,
    field: &str,
) -> Result<&'a sqlgate::Operation> {
    let found = match field.split_once('.') {
        Some(("Query", name)) => schema.operations.query(name),
        Some(("Mutation", name)) => schema.operations.mutation(name),
        Some((owner, name)) => schema
            .operations
            .get(&FieldOwner::Type(owner.to_string()), name),
        None => schema
            .operations
            .query(field)
            .or_else(|| schema.operations.mutation(field)),
    };
    found.ok_or_else(|| Error::Validation(format!("no data-access field '{}'", field)))
}

fn parse_args(text: &str) -> Result<Args> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, ArgValue::from(v)))
            .collect()),
        other => Err(Error::Validation(format!(
            "--args must be a JSON object, got {}",
            other
        ))),
    }
}
