use clap::Parser;
use nagare::prelude::*;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Runs one turn of a node-based workflow and prints the result
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the workflow definition JSON file
    workflow: PathBuf,

    /// The user message for this turn (`sys.message`)
    #[arg(short, long, default_value = "")]
    message: String,

    /// Conversation variables, as a JSON object or a path to a JSON file
    #[arg(short, long)]
    conversation: Option<String>,

    /// Start node inputs, as a JSON object or a path to a JSON file
    #[arg(short, long)]
    inputs: Option<String>,

    /// Path to an engine configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-node timeout in seconds, overriding the configuration file
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print the final workflow state after the output
    #[arg(long)]
    dump_state: bool,
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Accepts either inline JSON or a path to a file holding it.
fn load_object(source: &str, what: &str) -> Map<String, Value> {
    let text = if Path::new(source).is_file() {
        fs::read_to_string(source)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to read {} file '{}': {}", what, source, e)))
    } else {
        source.to_string()
    };
    match serde_json::from_str(&text) {
        Ok(Value::Object(map)) => map,
        Ok(other) => exit_with_error(&format!("{} must be a JSON object, got {}", what, other)),
        Err(e) => exit_with_error(&format!("Failed to parse {} JSON: {}", what, e)),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nagare=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let total_start = Instant::now();

    // --- 1. Configuration ---
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to load config: {}", e))),
        None => EngineConfig::default(),
    };
    if let Some(timeout) = cli.timeout {
        config = config.with_node_timeout(timeout);
    }

    // --- 2. Workflow Build ---
    let definition = WorkflowDefinition::from_file(&cli.workflow)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to load workflow: {}", e)));
    // No collaborators are wired in here; workflows that need one fail to build.
    let executor = WorkflowExecutor::build(definition, &NodeFactory::with_defaults(), &Services::new(), config)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to build workflow: {}", e)));

    // --- 3. State ---
    let mut system = SystemVariables::new(cli.message);
    if let Some(inputs) = &cli.inputs {
        system.input_variables = load_object(inputs, "inputs");
    }
    let conversation = cli
        .conversation
        .as_deref()
        .map(|c| load_object(c, "conversation"))
        .unwrap_or_default();

    let (sender, mut receiver) = mpsc::unbounded_channel::<StreamChunk>();
    let mut state = WorkflowState::new(system, conversation).with_chunk_sink(sender);
    let printer = tokio::spawn(async move {
        while let Some(chunk) = receiver.recv().await {
            println!("[{}] {}", chunk.node_id, chunk.content);
        }
    });

    // --- 4. Execution ---
    let result = executor.run(&mut state).await;
    state.set_chunk_sink(None);
    let _ = printer.await;

    let result = result.unwrap_or_else(|e| exit_with_error(&format!("Workflow failed: {}", e)));

    // --- 5. Results ---
    println!("\nWorkflow Finished!");
    for record in &result.records {
        let route = record.route.as_deref().unwrap_or("-");
        println!(
            "  {:<24} {:<20} {:<10?} route={} ({} ms)",
            record.node_id, record.node_type, record.status, route, record.elapsed_ms
        );
    }
    println!("\nOutput:\n{}", serde_json::to_string_pretty(&result.output).unwrap_or_default());
    if !state.errors.is_empty() {
        println!("\nTool errors:");
        for error in &state.errors {
            println!("  {} ({}): {}", error.node_id, error.tool, error.error);
        }
    }
    if cli.dump_state {
        println!("\nState:\n{}", serde_json::to_string_pretty(&state).unwrap_or_default());
    }
    println!("\nTotal Execution: {:?}", total_start.elapsed());
}
