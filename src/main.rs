//! nlquery - ask a structured data service questions in plain English.
//!
//! A completion endpoint turns the question into a schema-shaped JSON query,
//! which is normalized, validated and sent to the query service. Results are
//! printed as a table or as JSON.

mod agent;
mod config;
mod error;
mod filters;
mod llm;
mod normalizer;
mod render;
mod request;
mod schema;
#[cfg(test)]
mod test_support;
mod transport;

use agent::{Agent, QueryReport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use filters::QueryFilters;
use render::Renderer;
use schema::QuerySchema;
use std::io::Write;
use std::process::Command as ProcessCommand;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use transport::{QueryClient, QueryOutcome};

#[derive(Parser)]
#[command(name = "nlquery")]
#[command(author, version, about = "Query a data service in plain English")]
#[command(long_about = "Translates a plain English question into a structured query, \
sends it to the query service and prints the matching records.\n\n\
Without arguments an interactive prompt is started.")]
struct Cli {
    /// Run a single query instead of starting the interactive prompt
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Override the completion model
    #[arg(short = 'm', long, value_name = "MODEL", global = true)]
    model: Option<String>,

    /// Override the query service endpoint
    #[arg(short = 'e', long, value_name = "URL", global = true)]
    endpoint: Option<String>,

    /// Skip schema validation of the model output
    #[arg(long, global = true)]
    no_validate: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a query and print the filters without running it
    Parse {
        /// The question to translate
        query: String,
    },
    /// Run canonical filters given as JSON, skipping the model
    Filters {
        /// e.g. '{"department": "Engineering", "min_hours": 10}'
        #[arg(value_name = "JSON")]
        filters: String,
    },
    /// Print the query schema shown to the model
    Schema,
    /// Open configuration file in $EDITOR
    Config,
}

/// Command-line overrides applied on top of the config file.
struct Overrides {
    model: Option<String>,
    endpoint: Option<String>,
    no_validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let overrides = Overrides {
        model: cli.model,
        endpoint: cli.endpoint,
        no_validate: cli.no_validate,
    };
    let renderer = Renderer::for_stdout();

    match cli.command {
        Some(Commands::Schema) => handle_schema(),
        Some(Commands::Config) => handle_config(),
        Some(Commands::Parse { query }) => {
            let agent = build_agent(&overrides)?;
            handle_parse(&agent, &query, renderer).await
        }
        Some(Commands::Filters { filters }) => {
            let agent = build_agent(&overrides)?;
            handle_filters(&agent, &filters, renderer, cli.json).await
        }
        None => {
            let agent = build_agent(&overrides)?;
            match cli.query {
                Some(query) => handle_single(&agent, &query, renderer, cli.json).await,
                None => run_interactive(&agent, renderer, cli.json).await,
            }
        }
    }
}

/// Logs go to stderr so stdout only carries results.
fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nlquery={}", level)))
        .add_directive("reqwest=warn".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Load configuration and wire up the pipeline.
fn build_agent(overrides: &Overrides) -> Result<Agent> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(model) = &overrides.model {
        config.completion.set_model(model.clone());
        info!("Model overridden: {}", config.completion.model_name());
    }
    if let Some(endpoint) = &overrides.endpoint {
        config.query_service.url = endpoint.clone();
    }
    if overrides.no_validate {
        config.validation.enabled = false;
    }

    let schema = Arc::new(QuerySchema::new()?);
    let backend = llm::create_backend(&config.completion, config.generation.settings())
        .context("Failed to create completion backend")?;
    let transport = QueryClient::new(
        config.query_service.url.clone(),
        config.query_service.timeout(),
    )
    .context("Failed to create query service client")?;

    info!(
        "Using {} ({}), query service {}",
        backend.name(),
        backend.model(),
        transport.endpoint()
    );
    if !config.validation.enabled {
        info!("Schema validation disabled");
    }

    Ok(Agent::new(
        config,
        schema,
        Box::new(backend),
        Box::new(transport),
    ))
}

fn handle_schema() -> Result<()> {
    let schema = QuerySchema::new()?;
    println!("{}", serde_json::to_string_pretty(schema.document())?);
    Ok(())
}

/// Handle the config command.
fn handle_config() -> Result<()> {
    let config_path = Config::config_path()?;

    // Create default config if it doesn't exist
    if !config_path.exists() {
        Config::default().save()?;
        println!("Created default config at {}", config_path.display());
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = ProcessCommand::new(&editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        eprintln!("Editor exited with non-zero status");
    }

    Ok(())
}

async fn handle_parse(agent: &Agent, query: &str, renderer: Renderer) -> Result<()> {
    match agent.parse_query(query).await {
        Ok(filters) => {
            if filters.is_empty() {
                eprintln!("{}", renderer.filters(&filters));
            }
            let request = request::QueryRequest::build(&filters);
            let output = serde_json::json!({ "filters": filters, "request": request });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", renderer.agent_error(&e));
            std::process::exit(1);
        }
    }
}

async fn handle_filters(agent: &Agent, raw: &str, renderer: Renderer, json: bool) -> Result<()> {
    let filters: QueryFilters =
        serde_json::from_str(raw).context("Filters must be a JSON object of canonical filters")?;
    let (request, outcome) = agent.execute(&filters).await;
    let report = QueryReport {
        filters,
        request,
        outcome,
    };
    print_report(&report, renderer, json)?;
    if !report.outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Run one query and exit non-zero on any failure.
async fn handle_single(agent: &Agent, query: &str, renderer: Renderer, json: bool) -> Result<()> {
    match agent.process(query).await {
        Ok(report) => {
            print_report(&report, renderer, json)?;
            if !report.outcome.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", renderer.agent_error(&e));
            std::process::exit(1);
        }
    }
}

/// Read queries until `exit`, end of input or Ctrl-C.
async fn run_interactive(agent: &Agent, renderer: Renderer, json: bool) -> Result<()> {
    println!("{}", renderer.heading("Natural language data query"));
    println!("Type your query or 'exit' to quit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => goodbye(),
        };
        let Some(line) = line else {
            println!();
            return Ok(());
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            return Ok(());
        }

        println!("\nProcessing query: \"{}\"", query);
        tokio::select! {
            result = agent.process(query) => match result {
                Ok(report) => print_report(&report, renderer, json)?,
                Err(e) => eprintln!("{}", renderer.agent_error(&e)),
            },
            _ = tokio::signal::ctrl_c() => goodbye(),
        }
        println!();
    }
}

/// Ctrl-C ends the whole process, including any request in flight.
fn goodbye() -> ! {
    println!("\nGoodbye!");
    std::process::exit(0);
}

fn print_report(report: &QueryReport, renderer: Renderer, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "filters": report.filters,
            "request": report.request,
            "result": report.outcome,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", renderer.filters(&report.filters));
    println!("\n{}", renderer.heading("Results"));
    match &report.outcome {
        QueryOutcome::Success(_) => println!("{}", renderer.outcome(&report.outcome)),
        QueryOutcome::Failure(_) => eprintln!("{}", renderer.outcome(&report.outcome)),
    }
    Ok(())
}
