use anyhow::{Context, Result};
use clap::Parser;
use newsgraph_app::{
    GraphController, GraphDataService, GraphSettings, HttpGraphService, StaticGraphService,
};
use newsgraph_core::{ElementRef, EntityType};
use crossbeam_channel::Receiver;
use newsgraph_events::{Event, EventListener, dispatch_to};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod command;

use command::{Command, HELP};

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive entity co-occurrence graph shell", long_about = None)]
struct Args {
    /// JSON dataset of `{nodes, links}` served from memory
    #[arg(short, long, conflicts_with = "service_url")]
    dataset: Option<PathBuf>,

    /// Base URL of the graph data service (overrides the config file)
    #[arg(long)]
    service_url: Option<String>,

    /// Settings file
    #[arg(short, long, default_value = "newsgraph.json")]
    config: PathBuf,

    /// Print every published event as JSON
    #[arg(long)]
    events: bool,

    /// Skip the initial full-graph load
    #[arg(long)]
    no_load: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = GraphSettings::load_or_default(&args.config)?;
    if let Some(url) = &args.service_url {
        settings.data_service.base_url = url.clone();
    }

    let service: Arc<dyn GraphDataService> = match &args.dataset {
        Some(path) => Arc::new(StaticGraphService::from_json_file(path)?),
        None => Arc::new(
            HttpGraphService::new(&settings.data_service)
                .context("Failed to set up the data service client")?,
        ),
    };
    let controller = GraphController::new(service, settings);
    let events = controller.events();

    if !args.no_load {
        match controller.load_full_graph().await {
            Ok((nodes, edges)) => println!("Loaded {nodes} nodes and {edges} edges."),
            Err(err) => eprintln!("error: {err}"),
        }
        flush_events(&events, args.events);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("error: {err}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = run(&controller, command).await {
            eprintln!("error: {err}");
        }
        flush_events(&events, args.events);
    }
    Ok(())
}

async fn run(controller: &GraphController, command: Command) -> Result<()> {
    match command {
        Command::Load => {
            let (nodes, edges) = controller.load_full_graph().await?;
            println!("Loaded {nodes} nodes and {edges} edges.");
        }
        Command::Expand(id) => {
            let delta = controller.expand(id).await?;
            println!("+{} nodes, +{} edges", delta.added_nodes.len(), delta.added_edges.len());
        }
        Command::More(id) => {
            let delta = controller.load_more(id).await?;
            println!("+{} nodes, +{} edges", delta.added_nodes.len(), delta.added_edges.len());
        }
        Command::Ego => {
            let delta = controller.ego_selected().await?;
            println!("+{} nodes, +{} edges", delta.added_nodes.len(), delta.added_edges.len());
        }
        Command::Collapse(id) => {
            let delta = controller.collapse(id)?;
            println!(
                "-{} nodes, -{} edges",
                delta.removed_nodes.len(),
                delta.removed_edges.len()
            );
        }
        Command::ToggleNode(id) => {
            let selected = controller.toggle_node(id)?;
            println!("{} {}", if selected { "selected" } else { "unselected" }, id);
        }
        Command::ToggleEdge(id) => {
            let selected = controller.toggle_edge(id)?;
            println!("{} edge {}", if selected { "selected" } else { "unselected" }, id);
        }
        Command::SelectName(name) => {
            let ids = controller.select_by_name(&name).await?;
            println!("selected {} node(s)", ids.len());
        }
        Command::UnselectName(name) => {
            let ids = controller.unselect_by_name(&name);
            println!("unselected {} node(s)", ids.len());
        }
        Command::Clear => controller.clear_selection(),
        Command::Merge(focal, ids) => {
            let outcome = controller.merge(focal, &ids)?;
            println!("merged {} node(s) into {}", outcome.absorbed.len(), focal);
        }
        Command::MergeSelected(focal) => {
            let outcome = controller.merge_selected(focal)?;
            println!("merged {} node(s) into {}", outcome.absorbed.len(), focal);
        }
        Command::Hide => {
            let delta = controller.hide_selected()?;
            println!(
                "hid {} nodes and {} edges",
                delta.removed_nodes.len(),
                delta.removed_edges.len()
            );
        }
        Command::Rename(id, name) => {
            if !controller.edit_name(id, &name).await? {
                println!("unchanged");
            }
        }
        Command::Retype(id, kind) => {
            if !controller.edit_type(id, kind).await? {
                println!("unchanged");
            }
        }
        Command::Note(text) => {
            let target = controller.annotate(&text)?;
            match target {
                ElementRef::Entity(id) => println!("noted on node {id}"),
                ElementRef::Relationship(id) => println!("noted on edge {id}"),
            }
        }
        Command::Show => print_graph(controller),
        Command::Selection => {
            println!("{}", controller.selection_text());
            println!("{:?}", controller.gates());
        }
        Command::Words => {
            let highlight = controller.highlight();
            for kind in EntityType::ALL {
                let words: Vec<&str> = highlight.get(kind).iter().map(String::as_str).collect();
                println!("{:<14} {}", kind.label(), words.join(", "));
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn print_graph(controller: &GraphController) {
    let snapshot = controller.snapshot();
    for node in &snapshot.nodes {
        let owners: Vec<String> = node.provenance.iter().map(|p| p.to_string()).collect();
        println!(
            "{:>8} {:<4} {:>8} {}{}{}",
            node.id.0,
            node.kind,
            node.frequency,
            node.name,
            if node.expanded { " [expanded]" } else { "" },
            if owners.is_empty() {
                String::new()
            } else {
                format!(" <- {}", owners.join(","))
            }
        );
    }
    for edge in &snapshot.edges {
        println!(
            "{:>8} {} -- {} ({})",
            edge.id.0, edge.source, edge.target, edge.frequency
        );
    }
}

/// Mirrors bus traffic on the terminal.
struct ConsoleListener {
    verbose: bool,
}

impl EventListener for ConsoleListener {
    fn handle_event(&mut self, event: &Event) {
        if !self.verbose {
            tracing::debug!("{:?}", event);
            return;
        }
        match serde_json::to_string(event) {
            Ok(json) => println!("{json}"),
            Err(err) => tracing::warn!("Failed to serialize event: {}", err),
        }
    }
}

fn flush_events(events: &Receiver<Event>, verbose: bool) {
    dispatch_to(events, &mut ConsoleListener { verbose });
}
