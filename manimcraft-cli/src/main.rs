//! # manimcraft CLI
//!
//! Command-line interface for generating Manim tutorial videos.
//!
//! Usage:
//!   manimcraft run --topic <TEXT>
//!   manimcraft run --images <DIR>
//!   manimcraft prompt
//!   manimcraft lookup <URL>
//!   manimcraft render <FILE>
//!
//! Examples:
//!   manimcraft run --topic "Explain binary search"
//!   manimcraft run --topic-file chapter3.txt --images input/ --max-attempts 3
//!   manimcraft lookup https://docs.manim.community/en/stable/reference/manim.mobject.geometry.arc.Circle.html

mod config;

use clap::{Parser, Subcommand};
use config::Config;
use manimcraft_agent::{build_system_prompt, load_images, task_message, Agent, DocStore, Renderer};
use manimcraft_error::{Error, ErrorKind, Result};
use manimcraft_llm::{LlmProvider, Provider, ProviderType};
use std::path::{Path, PathBuf};
use tracing::info;

/// Topic used when only screenshots are given
const SCREENSHOT_TOPIC: &str =
    "Based on these instructions and previous examples, generate a valid Manim tutorial using the content in these screenshots.";

#[derive(Parser)]
#[command(name = "manimcraft")]
#[command(author, version, about = "manimcraft - LLM-written Manim tutorials, rendered and repaired")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ./manimcraft.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, render and repair a tutorial video
    Run {
        /// Topic or textbook excerpt to teach
        #[arg(short, long, conflicts_with = "topic_file")]
        topic: Option<String>,

        /// Read the topic from a file
        #[arg(long)]
        topic_file: Option<PathBuf>,

        /// Directory of PNG/JPEG textbook screenshots to attach
        #[arg(short, long)]
        images: Option<PathBuf>,

        /// Maximum generate/render attempts
        #[arg(short = 'n', long)]
        max_attempts: Option<usize>,

        /// Where the finished video goes
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Oracle provider: anthropic or openai
        #[arg(long, value_parser = parse_provider)]
        provider: Option<ProviderType>,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Print the assembled system prompt
    Prompt,
    /// Print what the documentation tool returns for a url
    Lookup {
        /// Documentation page url
        #[arg(required = true)]
        url: String,
    },
    /// Render an existing script once, without the oracle
    Render {
        /// Python file defining the scene class
        #[arg(required = true)]
        file: PathBuf,
    },
}

fn parse_provider(s: &str) -> std::result::Result<ProviderType, String> {
    match s.to_ascii_lowercase().as_str() {
        "anthropic" => Ok(ProviderType::Anthropic),
        "openai" => Ok(ProviderType::OpenAI),
        other => Err(format!("unknown provider '{}', expected anthropic or openai", other)),
    }
}

fn init_tracing(verbose: bool) {
    // Always keep the HTTP and HTML parsing crates quiet.
    let noisy = ",hyper=warn,reqwest=warn,html5ever=warn";
    let directives = match std::env::var("RUST_LOG") {
        Ok(user) if !user.trim().is_empty() => format!("{}{}", user, noisy),
        _ => format!("{}{}", if verbose { "debug" } else { "info" }, noisy),
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(directives))
        .with_target(false)
        .try_init()
        .ok();
}

struct RunArgs {
    topic: Option<String>,
    topic_file: Option<PathBuf>,
    images: Option<PathBuf>,
}

fn read_topic(args: &RunArgs) -> Result<String> {
    match (&args.topic, &args.topic_file, &args.images) {
        (Some(topic), _, _) => Ok(topic.clone()),
        (None, Some(path), _) => {
            if !path.exists() {
                return Err(Error::file_not_found(path.display().to_string()));
            }
            Ok(std::fs::read_to_string(path)?)
        }
        (None, None, Some(_)) => Ok(SCREENSHOT_TOPIC.to_string()),
        (None, None, None) => Err(Error::new(
            ErrorKind::InvalidArgument,
            "nothing to teach: pass --topic, --topic-file or --images",
        )),
    }
}

async fn run_job(config: &Config, args: RunArgs) -> Result<()> {
    let topic = read_topic(&args)?;
    let images = match &args.images {
        Some(dir) => load_images(dir)?,
        None => Vec::new(),
    };

    let docs = DocStore::open(&config.paths.pages_dir)?;
    let system_prompt = build_system_prompt(&docs, &config.prompt_sources())?;
    let provider = Provider::from_config(config.provider_config()?)
        .map_err(|e| e.into_error("Provider::from_config"))?;
    info!(
        provider = provider.name(),
        model = config.provider.model.as_deref().unwrap_or(provider.default_model()),
        pages = docs.len(),
        "ready"
    );

    let mut agent = Agent::new(provider, config.renderer(), docs, system_prompt, config.agent_config());
    let result = agent.run(&task_message(&topic), images).await;

    let usage = agent.usage();
    info!(
        calls = usage.total_calls,
        prompt_tokens = usage.total_prompt_tokens,
        completion_tokens = usage.total_completion_tokens,
        cached_tokens = usage.total_cached_tokens,
        "token usage"
    );

    let outcome = result?;
    println!("Video:    {}", outcome.video.display());
    println!("Code:     {}", outcome.code_file.display());
    println!("Attempts: {}", outcome.attempts);
    Ok(())
}

fn show_prompt(config: &Config) -> Result<()> {
    let docs = DocStore::open(&config.paths.pages_dir)?;
    println!("{}", build_system_prompt(&docs, &config.prompt_sources())?);
    Ok(())
}

fn lookup(config: &Config, url: &str) -> Result<()> {
    let docs = DocStore::open(&config.paths.pages_dir)?;
    println!("{}", docs.lookup(url));
    Ok(())
}

async fn render_file(config: &Config, file: &Path) -> Result<()> {
    let video = config.renderer().render(file).await?;
    println!("Video: {}", video.path.display());
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { topic, topic_file, images, max_attempts, output_dir, provider, model } => {
            if let Some(n) = max_attempts {
                config.limits.max_attempts = n;
            }
            if let Some(dir) = output_dir {
                config.paths.output_dir = dir;
            }
            if let Some(kind) = provider {
                if kind != config.provider.kind {
                    config.provider.kind = kind;
                    config.provider.model = None;
                }
            }
            if let Some(model) = model {
                config.provider.model = Some(model);
            }
            config.validate()?;
            run_job(&config, RunArgs { topic, topic_file, images }).await
        }
        Commands::Prompt => show_prompt(&config),
        Commands::Lookup { url } => lookup(&config, &url),
        Commands::Render { file } => {
            config.validate()?;
            render_file(&config, &file).await
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        match e.kind() {
            ErrorKind::AttemptsExhausted => eprintln!("Manim compilation failed after maximum attempts: {}", e),
            _ => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}
