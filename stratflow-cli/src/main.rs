//! StratFlow CLI — validate, render, and inspect strategy documents.
//!
//! Commands:
//! - `validate` — run every consistency check over a document and report
//!   violations (non-zero exit when any are found)
//! - `render` — print each signal node's condition tree as one line
//! - `inspect` — summarize nodes, positions, re-entry groups, indicators

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use stratflow_core::conditions::{render, validate as validate_tree};
use stratflow_core::domain::{IndicatorCatalogue, NodeData, ReEntryConfig};
use stratflow_core::persist::StrategyDocument;
use stratflow_core::store::{GraphStore, InMemoryGraphStore};
use stratflow_core::sync::sync_all;
use stratflow_core::tracker::find_usages;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "stratflow",
    about = "StratFlow CLI — strategy-graph consistency tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every consistency check over a strategy document.
    Validate {
        /// Path to a strategy JSON file.
        file: PathBuf,
    },
    /// Print each signal node's condition tree as a single line.
    Render {
        /// Path to a strategy JSON file.
        file: PathBuf,
    },
    /// Summarize nodes, positions, re-entry groups, and indicators.
    Inspect {
        /// Path to a strategy JSON file.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Render { file } => cmd_render(&file),
        Commands::Inspect { file } => cmd_inspect(&file),
    }
}

fn load(file: &PathBuf) -> Result<InMemoryGraphStore> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let doc = StrategyDocument::from_json(&json)
        .with_context(|| format!("parsing {}", file.display()))?;
    info!(nodes = doc.nodes.len(), edges = doc.edges.len(), "document loaded");
    let mut store = doc.into_store().context("building graph store")?;
    store.drain_events();
    Ok(store)
}

/// The start node's catalogue, or an empty one when the graph has no
/// start node yet.
fn catalogue_of(store: &InMemoryGraphStore) -> IndicatorCatalogue {
    store
        .nodes()
        .iter()
        .find_map(|node| match &node.data {
            NodeData::Start(start) => Some(start.indicators.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn cmd_validate(file: &PathBuf) -> Result<()> {
    let mut store = load(file)?;
    let catalogue = catalogue_of(&store);
    let mut problems: Vec<String> = Vec::new();

    // duplicate VPIs across every action node
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for node in store.nodes() {
        for position in node.data.positions().into_iter().flatten() {
            if position.vpi.is_empty() {
                continue;
            }
            if let Some(other) = seen.insert(position.vpi.clone(), node.id.to_string()) {
                problems.push(format!(
                    "duplicate vpi '{}' on nodes {} and {}",
                    position.vpi, other, node.id
                ));
            }
        }
    }

    // SL/TSL exclusivity
    for node in store.nodes() {
        if let NodeData::Exit(data) = &node.data {
            if data.post_execution.stop_loss.enabled && data.post_execution.trailing_stop.enabled {
                problems.push(format!(
                    "node {}: stop-loss and trailing-stop are both enabled",
                    node.id
                ));
            }
        }
    }

    // condition tree shape
    for node in store.nodes() {
        if let Some(root) = node.data.condition_root() {
            if let Err(violations) = validate_tree(root, &catalogue) {
                for violation in violations {
                    problems.push(format!("node {}: {}", node.id, violation));
                }
            }
        }
    }

    // re-entry groups must be converged
    let writes = sync_all(&mut store).context("running re-entry convergence check")?;
    if writes > 0 {
        problems.push(format!(
            "re-entry groups were not converged ({writes} node(s) needed correction)"
        ));
    }

    if problems.is_empty() {
        println!("ok: {} nodes, {} edges", store.nodes().len(), store.edges().len());
        Ok(())
    } else {
        for problem in &problems {
            eprintln!("error: {problem}");
        }
        bail!("{} problem(s) found", problems.len());
    }
}

fn cmd_render(file: &PathBuf) -> Result<()> {
    let store = load(file)?;
    let catalogue = catalogue_of(&store);
    for node in store.nodes() {
        if let Some(root) = node.data.condition_root() {
            let label = if node.label.is_empty() {
                node.id.to_string()
            } else {
                node.label.clone()
            };
            println!("{} [{}]: {}", label, node.kind(), render(root, &catalogue));
        }
    }
    Ok(())
}

fn cmd_inspect(file: &PathBuf) -> Result<()> {
    let store = load(file)?;
    let catalogue = catalogue_of(&store);

    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    let mut positions = 0usize;
    for node in store.nodes() {
        *kinds.entry(node.kind().to_string()).or_default() += 1;
        positions += node.data.positions().map(|p| p.len()).unwrap_or(0);
    }
    println!("nodes:");
    for (kind, count) in &kinds {
        println!("  {kind}: {count}");
    }
    println!("edges: {}", store.edges().len());
    println!("positions: {positions}");

    let mut groups: BTreeMap<u32, Vec<(String, u32)>> = BTreeMap::new();
    for node in store.nodes() {
        let mut collect = |re: &ReEntryConfig| {
            if re.enabled {
                groups
                    .entry(re.group_number)
                    .or_default()
                    .push((node.id.to_string(), re.max_re_entries));
            }
        };
        match &node.data {
            NodeData::Retry(retry) => collect(&retry.re_entry),
            NodeData::Exit(exit) => {
                for feature in stratflow_core::domain::RiskFeature::ALL {
                    if let Some(re) = &exit.post_execution.feature(feature).re_entry {
                        collect(re);
                    }
                }
            }
            _ => {}
        }
    }
    if !groups.is_empty() {
        println!("re-entry groups:");
        for (group, members) in &groups {
            let limits: Vec<String> = members
                .iter()
                .map(|(id, max)| format!("{id} (max {max})"))
                .collect();
            println!("  group {group}: {}", limits.join(", "));
        }
    }

    if !catalogue.entries.is_empty() {
        println!("indicators:");
        for key in catalogue.keys() {
            let usages = find_usages(&store, key);
            println!("  {key}: used by {} node(s)", usages.len());
        }
    }
    Ok(())
}
