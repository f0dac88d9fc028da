//! # Agent Workflow Runner
//!
//! Command-line front end for the `agent-workflow` framework:
//! - run the bundled demo workflows against a real or scripted model
//! - print a workflow graph as Mermaid
//! - list providers and the models they serve
//! - send a single prompt to the configured model
//!
//! ## Quick Start
//! ```bash
//! cargo run -- run document --mock
//! cargo run -- --model gpt-4o-mini run hiking --input Sapporo
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Configuration management
mod config;

/// Bundled demo workflows
mod demos;

// =============================================================================
// IMPORTS
// =============================================================================
use std::io::Write;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use agent_workflow::llm::Llm;
use agent_workflow::ModelFactory;

use crate::config::Config;
use crate::demos::Demo;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "agent-workflow",
    version,
    about = "Run multi-step LLM workflows built from agent nodes",
    long_about = r#"
Agent Workflow - multi-step LLM pipelines with error short-circuiting.

Models are resolved to a provider by name:
  claude-*   Anthropic   (ANTHROPIC_API_KEY)
  gemini-*   Google      (GEMINI_API_KEY)
  gpt-*      OpenAI      (OPENAI_API_KEY)
  others     LM Studio   (listed in LMSTUDIO_MODELS, served at LMSTUDIO_HOST)

EXAMPLES:
  # Run a demo without any API key
  agent-workflow run conditional --mock

  # Show the graph of a demo
  agent-workflow graph document

  # Ask LM Studio for its models
  agent-workflow models --discover
"#
)]
struct Args {
    /// Model to use (overrides AWF_MODEL)
    #[arg(short = 'm', long = "model", env = "AWF_MODEL", global = true)]
    model: Option<String>,

    /// Provider name, skipping model-name resolution (overrides AWF_PROVIDER)
    #[arg(short = 'p', long = "provider", env = "AWF_PROVIDER", global = true)]
    provider: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a demo workflow
    Run {
        #[arg(value_enum)]
        demo: Demo,

        /// Input text (document, request or city depending on the demo)
        #[arg(short = 'i', long = "input")]
        input: Option<String>,

        /// Use the scripted model instead of a real provider
        #[arg(long = "mock", default_value = "false")]
        mock: bool,
    },

    /// Print a demo workflow as a Mermaid flowchart
    Graph {
        #[arg(value_enum)]
        demo: Demo,
    },

    /// List providers and known models
    Models {
        /// Query each provider's model endpoint
        #[arg(long = "discover", default_value = "false")]
        discover: bool,
    },

    /// Send one prompt to the configured model
    Prompt {
        #[arg(value_name = "TEXT")]
        text: String,

        /// Print the reply as it streams in
        #[arg(long = "stream", default_value = "false")]
        stream: bool,
    },
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    init_logging(args.verbose, &config.log_level)?;

    if let Some(model) = args.model {
        info!(model = %model, "Using model from command line");
        config.model = model;
    }
    if let Some(provider) = args.provider {
        config.provider = Some(provider);
    }
    config.validate()?;

    info!(
        model = %config.model,
        provider = ?config.provider,
        lmstudio_host = %config.lmstudio_host,
        "Configuration loaded"
    );

    match args.command {
        Command::Run { demo, input, mock } => run_demo(&config, demo, input, mock).await,
        Command::Graph { demo } => {
            println!("{}", demos::mermaid(demo)?);
            Ok(())
        }
        Command::Models { discover } => list_models(&config, discover).await,
        Command::Prompt { text, stream } => prompt(&config, &text, stream).await,
    }
}

fn model_factory(config: &Config) -> ModelFactory {
    let mut factory = ModelFactory::new(config.provider_settings());
    factory.set_models("lmstudio", config.lmstudio_models.clone());
    factory
}

fn create_model(config: &Config) -> Result<std::sync::Arc<dyn Llm>> {
    model_factory(config)
        .create_with_config(&config.llm_config(), config.provider.as_deref())
        .with_context(|| format!("creating model '{}'", config.model))
}

async fn run_demo(config: &Config, demo: Demo, input: Option<String>, mock: bool) -> Result<()> {
    let input = input.unwrap_or_else(|| demo.default_input().to_string());
    let llm = if mock {
        demos::mock_llm(demo, &input)
    } else {
        create_model(config)?
    };
    info!(demo = ?demo, model = llm.model_name(), provider = llm.provider_name(), "Running demo");

    let run = demos::run(demo, llm.clone(), &input).await?;

    println!("\n{}", "=".repeat(60));
    println!("PATH: {}", run.path.join(" -> "));
    println!("{}\n", "=".repeat(60));

    if let Some(err) = &run.error {
        error!(error = %err, "Workflow stopped early");
        eprintln!("Workflow stopped: {}", err);
        anyhow::bail!("workflow '{:?}' failed", demo);
    }

    println!("{}", run.output);
    let usage = llm.token_usage();
    if usage.total_tokens > 0 {
        info!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Token usage"
        );
    }
    Ok(())
}

async fn list_models(config: &Config, discover: bool) -> Result<()> {
    let mut factory = model_factory(config);
    if discover {
        factory.refresh_models().await;
    }

    for provider in factory.providers() {
        let models = factory.models(&provider);
        if models.is_empty() {
            println!("{}: (none known)", provider);
        } else {
            println!("{}:", provider);
            for model in models {
                println!("  {}", model);
            }
        }
    }
    Ok(())
}

async fn prompt(config: &Config, text: &str, stream: bool) -> Result<()> {
    let llm = create_model(config)?;

    if stream {
        let mut chunks = llm.stream(text).await?.into_inner();
        let mut stdout = std::io::stdout();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            write!(stdout, "{}", chunk.content)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
    } else {
        println!("{}", llm.invoke(text).await?);
    }
    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Install the global subscriber. `--verbose` forces debug output, otherwise
/// the `RUST_LOG`-style filter from the configuration applies.
fn init_logging(verbose: bool, filter: &str) -> Result<()> {
    let filter = if verbose { "debug" } else { filter };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_new(filter).context("invalid log filter")?)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
