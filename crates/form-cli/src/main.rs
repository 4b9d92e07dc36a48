use clap::{Parser, Subcommand, ValueEnum};
use form_spec::{
    EngineConfig, Submission, UserContext, ValidationIssue, Validator, issues_json_schema,
    validate_schema,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Form submission validator",
    long_about = "Validates form submissions and form definitions, and reports conditional visibility"
)]
struct Cli {
    /// Log engine activity to stderr (overridden by RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a submission against a form schema.
    Validate {
        /// Path to the form schema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Path to the submission JSON (`{ "data": { ... } }`).
        #[arg(long, value_name = "SUBMISSION")]
        submission: PathBuf,
        /// Optional engine config JSON.
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        /// Id of the submitting user, recorded in logs.
        #[arg(long)]
        user: Option<String>,
        /// Roles of the submitting user.
        #[arg(long = "role", value_name = "ROLE")]
        roles: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Check the structure of a form schema.
    CheckSchema {
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the visibility of every keyed component for the given data.
    Visibility {
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Path to the submission data object JSON.
        #[arg(long, value_name = "DATA")]
        data: PathBuf,
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the JSON Schema of the issue list.
    IssuesSchema,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Validate {
            schema,
            submission,
            config,
            user,
            roles,
            format,
        } => run_validate(
            &schema,
            &submission,
            config.as_deref(),
            UserContext { id: user, roles },
            format,
        ),
        Command::CheckSchema { schema, format } => run_check_schema(&schema, format),
        Command::Visibility {
            schema,
            data,
            config,
        } => run_visibility(&schema, &data, config.as_deref()),
        Command::IssuesSchema => {
            println!("{}", serde_json::to_string_pretty(&issues_json_schema())?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "form_spec=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json(path: &Path) -> CliResult<Value> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    let value = serde_json::from_str(&contents)
        .map_err(|err| format!("failed to parse {}: {}", path.display(), err))?;
    Ok(value)
}

fn load_validator(config: Option<&Path>) -> CliResult<Validator> {
    let config = match config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    debug!(?config, "engine config");
    Ok(Validator::new(config)?)
}

fn run_validate(
    schema_path: &Path,
    submission_path: &Path,
    config: Option<&Path>,
    user: UserContext,
    format: OutputFormat,
) -> CliResult<()> {
    let validator = load_validator(config)?;
    let schema = read_json(schema_path)?;
    let submission: Submission = serde_json::from_value(read_json(submission_path)?)?;

    let issues = validator.validate(&schema, &submission, &user);
    report(&issues, format)?;
    if issues.is_empty() {
        Ok(())
    } else {
        Err(format!("validation failed with {} issue(s)", issues.len()).into())
    }
}

fn run_check_schema(schema_path: &Path, format: OutputFormat) -> CliResult<()> {
    let schema = read_json(schema_path)?;
    let check = validate_schema(&schema);
    report(&check.issues, format)?;
    if check.is_valid() {
        Ok(())
    } else {
        Err("schema check failed".into())
    }
}

fn run_visibility(schema_path: &Path, data_path: &Path, config: Option<&Path>) -> CliResult<()> {
    let validator = load_validator(config)?;
    let schema = read_json(schema_path)?;
    let data = read_json(data_path)?;
    let map = validator.visibility(&schema, &data);
    println!("{}", serde_json::to_string_pretty(&map)?);
    Ok(())
}

fn report(issues: &[ValidationIssue], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(issues)?),
        OutputFormat::Text if issues.is_empty() => println!("Validation result: valid"),
        OutputFormat::Text => {
            println!("Validation result: invalid");
            println!("Issues:");
            for issue in issues {
                println!("  {}", issue);
            }
        }
    }
    Ok(())
}
