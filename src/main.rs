//! Command-line front end for the concierge agent.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use agent_core::{register_builtin_skills, AgentRuntime, MemoryStore, OrganizerStore};
use ai_agent::{AgentConfig, ClassifierConfig, ToolRegistry, TurnOutcome, UsageRecord};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llm_router::{LlmRouter, ModelTier, RouterConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Model provider (groq, openai, gemini)
    #[arg(long, env = "CONCIERGE_PROVIDER")]
    provider: Option<String>,

    /// Directory holding organizer.json and memory.json
    #[arg(long, env = "CONCIERGE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Tool-call rounds allowed per turn
    #[arg(long, default_value_t = ai_agent::DEFAULT_MAX_TOOL_ROUNDS)]
    max_tool_rounds: usize,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Run a single turn and print the answer
    Ask {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Add a todo item
    Todo {
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,
    },
    /// List pending todos
    Todos,
    /// Save a note
    Note {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// List saved notes
    Notes,
    /// List registered tools by category
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug,ai_agent=debug,agent_core=debug,llm_router=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).init();

    match &args.command {
        Commands::Chat => chat(&args).await,
        Commands::Ask { prompt } => {
            let mut runtime = build_runtime(&args)?;
            let result = runtime.run(&prompt.join(" ")).await?;
            println!("{}", result.turn.final_answer);
            Ok(())
        }
        Commands::Todo { task } => {
            let mut store = OrganizerStore::open(&args.data_dir)?;
            println!("{}", store.add_todo(&task.join(" "))?);
            Ok(())
        }
        Commands::Todos => {
            let store = OrganizerStore::open(&args.data_dir)?;
            println!("{}", store.list_todos());
            Ok(())
        }
        Commands::Note { text } => {
            let mut store = MemoryStore::open(&args.data_dir)?;
            store.add_note(&text.join(" "))?;
            println!("Note saved.");
            Ok(())
        }
        Commands::Notes => {
            let store = MemoryStore::open(&args.data_dir)?;
            if store.notes().is_empty() {
                println!("No notes yet.");
            }
            for note in store.notes() {
                println!("[{}] {}", note.timestamp, note.content);
            }
            Ok(())
        }
        Commands::Tools => list_tools(&args.data_dir),
    }
}

fn router_config(args: &Args) -> Result<RouterConfig> {
    let provider = args.provider.clone();
    let config = RouterConfig::from_lookup(|key| match (key, &provider) {
        ("CONCIERGE_PROVIDER", Some(provider)) => Some(provider.clone()),
        _ => std::env::var(key).ok(),
    })?;
    Ok(config)
}

fn build_runtime(args: &Args) -> Result<AgentRuntime> {
    let router = LlmRouter::new(router_config(args)?)?;
    let organizer = OrganizerStore::open(&args.data_dir)?;
    let memory = MemoryStore::open(&args.data_dir)?;

    let config = AgentConfig {
        max_tool_rounds: args.max_tool_rounds,
        model_options: router.options_for(ModelTier::Reasoning),
        ..AgentConfig::default()
    };
    let classifier_config = ClassifierConfig {
        model_options: router.options_for(ModelTier::Classifier),
        ..ClassifierConfig::default()
    };

    let runtime = AgentRuntime::builder(router.route(ModelTier::Reasoning))
        .with_classifier_model(router.route(ModelTier::Classifier))
        .with_config(config)
        .with_classifier_config(classifier_config)
        .with_organizer(Arc::new(Mutex::new(organizer)))
        .with_memory(Arc::new(Mutex::new(memory)))
        .build()
        .context("registering built-in skills")?;
    Ok(runtime)
}

async fn chat(args: &Args) -> Result<()> {
    let mut runtime = build_runtime(args)?;
    println!("Concierge is online. How can I help you today?");
    println!("Type 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        match runtime.run(input).await {
            Ok(result) => {
                println!("Concierge: {}", result.turn.final_answer);
                println!("{}", usage_line(&result.turn, &result.session_usage));
            }
            Err(err) => {
                eprintln!("An error occurred: {err:#}");
                eprintln!("Concierge recovered and is ready for the next command.");
            }
        }
    }
    Ok(())
}

fn usage_line(turn: &TurnOutcome, session: &UsageRecord) -> String {
    match &turn.usage {
        Some(last) => format!(
            "Intent: {} | Tokens: {} (p: {}, c: {}) | Session: {}",
            turn.category,
            last.total_units,
            last.prompt_units,
            last.completion_units,
            session.total_units
        ),
        None => format!(
            "Intent: {} | Tokens: n/a | Session: {}",
            turn.category, session.total_units
        ),
    }
}

fn list_tools(data_dir: &Path) -> Result<()> {
    let organizer = OrganizerStore::open(data_dir)?;
    let mut registry = ToolRegistry::new();
    register_builtin_skills(&mut registry, Arc::new(Mutex::new(organizer)))?;
    for (category, tool) in registry.descriptions() {
        println!(
            "{:<10} {:<20} {}",
            category.as_str(),
            tool.name,
            tool.description
        );
    }
    Ok(())
}
