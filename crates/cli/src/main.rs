use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use canvas_graph::{Node, NodeId, NodeStatus, NodeStore};
use generation::{
    EngineConfig, GenerationEngine, GenerationPlan, HttpMediaProbe, HttpProvider,
    HttpProviderConfig, MockProbe, MockProvider,
};

#[derive(Parser)]
#[command(name = "canvas-cli")]
#[command(about = "Canvas generation CLI - Headless node graph generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run generation for a node and write the updated graph back
    Generate {
        /// Graph file path
        #[arg(short, long)]
        graph: PathBuf,

        /// Node to generate, by id
        node: String,

        /// Output path (defaults to rewriting the graph file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Gateway base URL; omit to use the scripted mock gateway
        #[arg(long)]
        api_url: Option<String>,

        /// Gateway API key (or CANVAS_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print node state from a graph file
    Inspect {
        /// Graph file path
        graph: PathBuf,

        /// Limit to one node id
        #[arg(short, long)]
        node: Option<String>,
    },

    /// Resolve every generatable node and report the plan without calling out
    Validate {
        /// Graph file path
        graph: PathBuf,

        /// Engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Poll the gateway once for every node stuck in Loading
    Recover {
        /// Graph file path
        #[arg(short, long)]
        graph: PathBuf,

        /// Output path (defaults to rewriting the graph file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gateway base URL
        #[arg(long)]
        api_url: String,

        /// Gateway API key (or CANVAS_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },
}

/// On-disk graph document.
#[derive(Serialize, Deserialize)]
struct GraphFile {
    nodes: Vec<Node>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Generate {
            graph,
            node,
            output,
            config,
            api_url,
            api_key,
        } => generate_command(graph, node, output, config, api_url, api_key).await,
        Commands::Inspect { graph, node } => inspect_command(graph, node),
        Commands::Validate { graph, config } => validate_command(graph, config),
        Commands::Recover {
            graph,
            output,
            api_url,
            api_key,
        } => recover_command(graph, output, api_url, api_key).await,
    }
}

fn load_graph(path: &Path) -> Result<GraphFile> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph file {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing graph file {}", path.display()))
}

fn write_graph(store: &NodeStore, path: &Path) -> Result<()> {
    let mut nodes: Vec<Node> = store.graph().nodes.into_values().collect();
    nodes.sort_by_key(|n| n.id.0);
    let file = GraphFile { nodes };
    std::fs::write(path, serde_json::to_string_pretty(&file)?)
        .with_context(|| format!("writing graph file {}", path.display()))?;
    Ok(())
}

fn parse_node_id(raw: &str) -> Result<NodeId> {
    Uuid::parse_str(raw)
        .map(NodeId)
        .map_err(|_| anyhow!("invalid node id: {raw}"))
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("loading engine config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn resolve_api_key(flag: Option<String>) -> Option<String> {
    flag.or_else(|| std::env::var("CANVAS_API_KEY").ok())
}

fn build_engine(
    store: Arc<NodeStore>,
    config: EngineConfig,
    api_url: Option<String>,
    api_key: Option<String>,
) -> GenerationEngine {
    match api_url {
        Some(url) => {
            let mut provider_config = HttpProviderConfig::new(url.clone());
            if let Some(key) = resolve_api_key(api_key) {
                provider_config = provider_config.with_api_key(key);
            }
            GenerationEngine::new(
                store,
                Arc::new(HttpProvider::new(provider_config)),
                Arc::new(HttpMediaProbe::new(url)),
                config,
            )
        }
        None => {
            warn!("no --api-url given; using the scripted mock gateway");
            GenerationEngine::new(
                store,
                Arc::new(MockProvider::new()),
                Arc::new(MockProbe::default()),
                config,
            )
        }
    }
}

async fn generate_command(
    graph_path: PathBuf,
    node: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
    api_url: Option<String>,
    api_key: Option<String>,
) -> Result<()> {
    let node_id = parse_node_id(&node)?;
    let file = load_graph(&graph_path)?;
    let store = Arc::new(NodeStore::new(file.nodes));
    store
        .graph()
        .require(node_id)
        .with_context(|| format!("in {}", graph_path.display()))?;

    let config = load_config(config_path)?;
    let engine = build_engine(store.clone(), config, api_url, api_key);

    info!("Generating node {}", node_id);
    engine.generate(node_id).await;

    let settled = store
        .get(node_id)
        .ok_or_else(|| anyhow!("node {node_id} disappeared during generation"))?;
    match settled.status {
        NodeStatus::Success => info!(
            "Success: {}",
            settled.result_url.as_deref().unwrap_or("(no result url)")
        ),
        NodeStatus::Error => warn!(
            "Failed: {}",
            settled.error_message.as_deref().unwrap_or("(no message)")
        ),
        other => warn!("Node settled in unexpected status {:?}", other),
    }

    write_graph(&store, output.as_deref().unwrap_or(&graph_path))
}

fn inspect_command(graph_path: PathBuf, node: Option<String>) -> Result<()> {
    let file = load_graph(&graph_path)?;
    let filter = node.map(|raw| parse_node_id(&raw)).transpose()?;

    for node in &file.nodes {
        if let Some(wanted) = filter {
            if node.id != wanted {
                continue;
            }
        }
        println!(
            "{}  {:?}  {:?}  results={}  parents={}",
            node.id,
            node.kind,
            node.status,
            node.carousel_len(),
            node.parent_ids.len(),
        );
        if let Some(url) = &node.result_url {
            println!("    result: {url}");
        }
        if let Some(message) = &node.error_message {
            println!("    error: {message}");
        }
    }
    Ok(())
}

fn validate_command(graph_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let file = load_graph(&graph_path)?;
    let config = load_config(config_path)?;
    let store = NodeStore::new(file.nodes);
    let graph = store.graph();

    let mut generatable = 0usize;
    for node in graph.nodes.values() {
        match generation::resolver::resolve(&graph, node, &config) {
            Some(plan) => {
                generatable += 1;
                let kind = match plan {
                    GenerationPlan::SingleImage(_) => "image".to_string(),
                    GenerationPlan::FanOutImage { count, .. } => format!("image x{count}"),
                    GenerationPlan::LocalImage(_) => "local image".to_string(),
                    GenerationPlan::Video(_) => "video".to_string(),
                };
                println!("{}  {:?}  ok ({kind})", node.id, node.kind);
            }
            None if node.kind.is_image_capable() || node.kind.is_video() => {
                println!("{}  {:?}  invalid (missing prompt)", node.id, node.kind);
            }
            None => {}
        }
    }
    info!("{generatable} generatable node(s)");
    Ok(())
}

async fn recover_command(
    graph_path: PathBuf,
    output: Option<PathBuf>,
    api_url: String,
    api_key: Option<String>,
) -> Result<()> {
    let file = load_graph(&graph_path)?;
    let store = Arc::new(NodeStore::new(file.nodes));
    let loading = store.graph().loading_ids();
    if loading.is_empty() {
        info!("No nodes in Loading; nothing to recover");
        return Ok(());
    }
    info!("Polling {} in-flight node(s)", loading.len());

    let mut provider_config = HttpProviderConfig::new(api_url.clone());
    if let Some(key) = resolve_api_key(api_key) {
        provider_config = provider_config.with_api_key(key);
    }
    let provider = Arc::new(HttpProvider::new(provider_config));
    let probe = Arc::new(HttpMediaProbe::new(api_url));
    let reconciler = Arc::new(generation::Reconciler::new(store.clone(), probe));
    let poller = generation::RecoveryPoller::new(
        store.clone(),
        provider,
        reconciler,
        std::time::Duration::from_secs(EngineConfig::default().poll_interval_secs),
    );
    poller.poll_once().await;

    for id in loading {
        if let Some(node) = store.get(id) {
            println!("{}  {:?}", id, node.status);
        }
    }
    write_graph(&store, output.as_deref().unwrap_or(&graph_path))
}
