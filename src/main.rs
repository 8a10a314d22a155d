use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dora_birdview::analyzer::{AnalyzerRunner, graph_from_value};
use dora_birdview::config::BirdviewSettings;
use dora_birdview::graph::AnalysisType;
use dora_birdview::graph::export::to_element_list;
use dora_birdview::graph::normalize::{NormalizeOptions, normalize};
use dora_birdview::layout::LayoutAlgorithm;
use dora_birdview::render::{GraphElementRenderer, GraphProjectionInput, Projection};
use dora_birdview::state::store::JsonFileStore;
use dora_birdview::state::{
    ComplexityFilter, DependencyFilter, Grouping, LayoutDirection, ViewState, ViewStateManager,
    ViewStateOp,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "dora_birdview",
    about = "Normalize, filter and lay out code-analysis graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Normalize analyzer JSON (`-` for stdin) and print the element list.
    Normalize {
        input: PathBuf,
        #[arg(long, default_value = "fullCode")]
        analysis: AnalysisType,
    },
    /// Project analyzer JSON through a view's persisted state.
    Render {
        input: PathBuf,
        #[arg(long, default_value = "fullCode")]
        view: AnalysisType,
    },
    /// Update and print a view's persisted state.
    View(ViewArgs),
    /// Run an analyzer script on a target, then normalize and render its output.
    Analyze {
        target: PathBuf,
        #[arg(long, default_value = "fullCode")]
        analysis: AnalysisType,
    },
}

#[derive(Debug, Args)]
struct ViewArgs {
    view: AnalysisType,
    /// Restore defaults before applying the other flags.
    #[arg(long)]
    reset: bool,
    #[arg(long, conflicts_with = "deactivate")]
    activate: bool,
    #[arg(long)]
    deactivate: bool,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    complexity: Option<ComplexityFilter>,
    #[arg(long)]
    dependencies: Option<DependencyFilter>,
    #[arg(long)]
    show_modules: Option<bool>,
    #[arg(long)]
    show_files: Option<bool>,
    #[arg(long)]
    layout: Option<LayoutAlgorithm>,
    #[arg(long)]
    spacing: Option<f64>,
    #[arg(long)]
    direction: Option<LayoutDirection>,
    #[arg(long)]
    grouping: Option<Grouping>,
    #[arg(long)]
    zoom: Option<f64>,
    #[arg(long, num_args = 1..)]
    select: Vec<String>,
    #[arg(long, conflicts_with = "select")]
    clear_selection: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing()?;

    let cli = Cli::parse();
    let settings = BirdviewSettings::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Normalize { input, analysis } => {
            let value = read_json_input(&input)?;
            let graph = graph_from_value(value, &NormalizeOptions::new(analysis))?;
            print_json(&to_element_list(&graph))?;
        }
        Commands::Render { input, view } => {
            let value = read_json_input(&input)?;
            let graph = graph_from_value(value, &NormalizeOptions::new(view))?;
            let state = view_manager(&settings).get(view)?;
            let projection = project(&settings, &graph, &state)?;
            print_json(&projection)?;
        }
        Commands::View(args) => {
            let state = update_view(&settings, args)?;
            print_json(&state)?;
        }
        Commands::Analyze { target, analysis } => {
            let projection = run_analysis(&settings, analysis, &target).await?;
            print_json(&projection)?;
        }
    }

    Ok(())
}

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dora_birdview=debug"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(env_filter);

    let mut guard = None;
    let file_layer = match std::env::var("DORA_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let file_filter = EnvFilter::try_new(
                std::env::var("DORA_FILE_LOG").unwrap_or_else(|_| "debug".to_owned()),
            )
            .context("failed to parse DORA_FILE_LOG")?;
            let appender = tracing_appender::rolling::daily(dir.trim(), "dora_birdview.log");
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize tracing subscriber: {error}"))?;
    Ok(guard)
}

fn read_json_input(path: &Path) -> Result<serde_json::Value> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read analysis JSON from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?
    };

    serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not valid JSON", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let encoded = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{encoded}");
    Ok(())
}

fn view_manager(settings: &BirdviewSettings) -> ViewStateManager<JsonFileStore> {
    ViewStateManager::new(JsonFileStore::new(&settings.view_state_file))
}

fn project(
    settings: &BirdviewSettings,
    graph: &dora_birdview::graph::EnhancedGraphData,
    state: &ViewState,
) -> Result<Projection> {
    let projection = GraphElementRenderer::project(GraphProjectionInput {
        graph,
        view: state,
        options: settings.render_options(),
    })
    .map_err(|error| {
        warn!(kind = %error.kind, nodes = error.node_count, edges = error.edge_count, "projection failed");
        error
    })?;

    if projection.is_empty {
        info!("no graph data matches the current view; run an analysis or relax the filters");
    }
    Ok(projection)
}

fn update_view(settings: &BirdviewSettings, args: ViewArgs) -> Result<ViewState> {
    let mut manager = view_manager(settings);
    let view = args.view;
    let mut state = manager.get(view)?;

    if args.reset {
        state = manager.apply(view, ViewStateOp::Reset)?;
    }
    if args.activate {
        state = manager.apply(view, ViewStateOp::Activate)?;
    }
    if args.deactivate {
        state = manager.apply(view, ViewStateOp::Deactivate)?;
    }
    if let Some(query) = args.search {
        state = manager.apply(view, ViewStateOp::SetSearchQuery { query })?;
    }

    if args.complexity.is_some()
        || args.dependencies.is_some()
        || args.show_modules.is_some()
        || args.show_files.is_some()
    {
        let mut filters = state.filter_settings.clone();
        if let Some(filter) = args.complexity {
            filters.complexity_filter = filter;
        }
        if let Some(filter) = args.dependencies {
            filters.dependency_filter = filter;
        }
        if let Some(show) = args.show_modules {
            filters.show_modules = show;
        }
        if let Some(show) = args.show_files {
            filters.show_files = show;
        }
        state = manager.apply(view, ViewStateOp::SetFilters { filters })?;
    }

    if args.layout.is_some()
        || args.spacing.is_some()
        || args.direction.is_some()
        || args.grouping.is_some()
    {
        let mut layout = state.layout_settings.clone();
        if let Some(algorithm) = args.layout {
            layout.algorithm = algorithm;
        }
        if let Some(spacing) = args.spacing {
            layout.spacing = spacing;
        }
        if let Some(direction) = args.direction {
            layout.direction = direction;
        }
        if let Some(grouping) = args.grouping {
            layout.grouping = grouping;
        }
        state = manager.apply(view, ViewStateOp::SetLayout { layout })?;
    }

    if let Some(level) = args.zoom {
        state = manager.apply(view, ViewStateOp::SetZoom { level })?;
    }
    if !args.select.is_empty() {
        state = manager.apply(
            view,
            ViewStateOp::SelectNodes {
                node_ids: args.select,
            },
        )?;
    }
    if args.clear_selection {
        state = manager.apply(view, ViewStateOp::ClearSelection)?;
    }

    Ok(state)
}

async fn run_analysis(
    settings: &BirdviewSettings,
    analysis: AnalysisType,
    target: &Path,
) -> Result<Projection> {
    let runner = AnalyzerRunner::from_settings(settings);
    let data = runner
        .run(analysis, target)
        .await
        .with_context(|| format!("{analysis} analysis of `{}` failed", target.display()))?;

    let options = NormalizeOptions::new(analysis).project_path(target.display().to_string());
    let graph = normalize(&data, &options).context("failed to normalize analyzer output")?;

    let mut manager = view_manager(settings);
    let state = manager.apply(analysis, ViewStateOp::Activate)?;
    project(settings, &graph, &state)
}
