//! procycla - ProCycla simulation orchestrator CLI
//!
//! Runs the orchestrator API or drives single simulations from the shell.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use procycla_core::config::ENV_DATA_DIR;
use procycla_core::drivers::{FileSystemStore, HttpComputeClient, InMemoryStore, SimulationStore};
use procycla_core::pipeline::release_interrupted;
use procycla_core::{
    ApiServer, NewSimulation, Orchestrator, OrchestratorConfig, ProgressTicket, SimulationId, SimulationPatch,
    SimulationRecord, StageStatus,
};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "procycla")]
#[command(version = procycla_core::VERSION)]
#[command(about = "ProCycla simulation orchestrator", long_about = None)]
struct Cli {
    /// Config file (defaults to ./procycla.yaml, then environment)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
    /// Record store directory, overrides the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator HTTP API
    Serve {
        /// Bind address, overrides the config file
        #[arg(long)]
        listen: Option<String>,
        /// Keep records in memory only
        #[arg(long)]
        ephemeral: bool,
        /// Fail stages left running by a previous process before serving
        #[arg(long)]
        recover_interrupted: bool,
    },
    /// Create a simulation record
    Create {
        #[arg(long)]
        project: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Submission parameters (JSON file path or inline JSON)
        #[arg(long)]
        submit: String,
        /// Load-data stage output (JSON file path or inline JSON); marks load data finished
        #[arg(long)]
        load_data: Option<String>,
    },
    /// Record the output of the upstream load-data stage
    LoadData {
        simulation_id: String,
        /// Load-data output (JSON file path or inline JSON)
        #[arg(long)]
        result: String,
        /// Mark the load-data stage failed instead of finished
        #[arg(long)]
        failed: bool,
    },
    /// Run the pipeline for a simulation and wait for the pass to end
    Start {
        simulation_id: String,
    },
    /// Show one simulation
    Status {
        simulation_id: String,
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List simulations
    List,
    /// Apply a progress report by hand
    Progress {
        simulation_id: String,
        #[arg(long)]
        substrate_index: usize,
        #[arg(long)]
        length: usize,
        #[arg(long)]
        index: usize,
    },
    /// Delete a simulation record
    Delete {
        simulation_id: String,
    },
    /// Fail stages a killed process left running, so `start` retries them
    Reset {
        simulation_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve { listen, ephemeral, recover_interrupted } => {
            let mut config = load_config(&cli)?;
            if let Some(listen) = listen {
                config.listen = listen.clone();
            }
            let addr = config.listen_addr()?;

            let store: Arc<dyn SimulationStore> = if *ephemeral {
                Arc::new(InMemoryStore::new())
            } else {
                Arc::new(FileSystemStore::open(config.data_dir.clone())?)
            };
            let client = Arc::new(HttpComputeClient::from_config(&config)?);
            let orchestrator = Orchestrator::from_config(store, client, &config);

            if *recover_interrupted {
                for (id, stages) in orchestrator.recover_interrupted().await? {
                    println!("{} released {:?} of {}", "↺".yellow(), stages, id);
                }
            }

            println!("{} orchestrator API on http://{}", "▶".green(), addr);
            ApiServer::new(orchestrator).run(addr).await?;
        }
        Commands::Create { project, name, description, submit, load_data } => {
            let store = open_store(&cli)?;
            let submit_data = read_json_arg(submit).context("reading --submit")?;
            let load_data_result = match load_data {
                Some(arg) => Some(read_json_arg(arg).context("reading --load-data")?),
                None => None,
            };

            let record = store.create(NewSimulation {
                project_id: project.clone(),
                name: name.clone(),
                description: description.clone(),
                submit_data,
                load_data_result,
            })?;
            println!("✓ Created simulation {}", record.id.to_string().bold());
        }
        Commands::LoadData { simulation_id, result, failed } => {
            let store = open_store(&cli)?;
            let id = SimulationId::from(simulation_id.as_str());
            let result = read_json_arg(result).context("reading --result")?;
            let status = if *failed { StageStatus::Failed } else { StageStatus::Finished };

            let record = store.update_existing(&id, &SimulationPatch::load_data(status, Some(result)))?;
            println!("✓ Load data of {} is {}", record.id, paint(record.load_data_status));
        }
        Commands::Start { simulation_id } => {
            let config = load_config(&cli)?;
            let store: Arc<dyn SimulationStore> = Arc::new(FileSystemStore::open(data_dir(&cli, Some(&config)))?);
            let client = Arc::new(HttpComputeClient::from_config(&config)?);
            let orchestrator = Orchestrator::from_config(store.clone(), client, &config);

            let id = SimulationId::from(simulation_id.as_str());
            let handle = orchestrator.start(&id)?;
            if handle.await?.is_none() {
                bail!("pipeline pass for {} aborted, see log", id);
            }
            print_record(&store.require(&id)?);
        }
        Commands::Status { simulation_id, json } => {
            let store = open_store(&cli)?;
            let record = store.require(&SimulationId::from(simulation_id.as_str()))?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
        }
        Commands::List => {
            let store = open_store(&cli)?;
            let records = store.list()?;
            if records.is_empty() {
                println!("No simulations found.");
                return Ok(());
            }

            println!("\n{:<38} {:<24} {:<10} {:<10} {:<10} {:<8}", "ID", "NAME", "LOAD", "BMP", "CSTR", "PROGRESS");
            println!("{}", "-".repeat(104));
            for record in records {
                println!(
                    "{:<38} {:<24} {:<10} {:<10} {:<10} {:<8}",
                    record.id,
                    truncate(&record.name, 24),
                    paint(record.load_data_status),
                    paint(record.bmp_status),
                    paint(record.cstr_status),
                    format_progress(record.cstr_progress)
                );
            }
        }
        Commands::Progress { simulation_id, substrate_index, length, index } => {
            let store = open_store(&cli)?;
            let ticket = ProgressTicket {
                simulation_id: SimulationId::from(simulation_id.as_str()),
                substrate_index: *substrate_index,
                substrate_count: *length,
                variant_index: *index,
            };
            let progress = procycla_core::ProgressReporter::new(store).report(&ticket)?;
            println!("✓ Progress {:.2}%", progress);
        }
        Commands::Delete { simulation_id } => {
            let store = open_store(&cli)?;
            let id = SimulationId::from(simulation_id.as_str());
            if !store.delete(&id)? {
                bail!("simulation {} not found", id);
            }
            println!("✓ Deleted simulation {}", id);
        }
        Commands::Reset { simulation_id } => {
            let store = open_store(&cli)?;
            let id = SimulationId::from(simulation_id.as_str());
            let released = release_interrupted(store.as_ref(), &id)?;
            if released.is_empty() {
                println!("Nothing running for {}", id);
            } else {
                for stage in released {
                    println!("✓ {} of {} marked failed", stage, id);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::load_or_env(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

/// Store directory for commands that never call the compute services
fn data_dir(cli: &Cli, config: Option<&OrchestratorConfig>) -> PathBuf {
    if let Some(dir) = &cli.data_dir {
        return dir.clone();
    }
    if let Some(config) = config {
        return config.data_dir.clone();
    }
    match OrchestratorConfig::load_or_env(cli.config.as_deref()) {
        Ok(config) => config.data_dir,
        Err(_) => std::env::var(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(procycla_core::DEFAULT_DATA_DIR)),
    }
}

fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn SimulationStore>> {
    let dir = data_dir(cli, None);
    let store = FileSystemStore::open(dir.clone())
        .with_context(|| format!("opening record store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

/// Inline JSON, or the path of a JSON file
fn read_json_arg(arg: &str) -> anyhow::Result<JsonValue> {
    let path = Path::new(arg);
    let text = if path.is_file() {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    } else {
        arg.to_string()
    };
    serde_json::from_str(&text).context("not valid JSON")
}

fn paint(status: StageStatus) -> colored::ColoredString {
    match status {
        StageStatus::Pending => status.as_str().yellow(),
        StageStatus::Running => status.as_str().blue(),
        StageStatus::Finished => status.as_str().green(),
        StageStatus::Failed => status.as_str().red(),
    }
}

fn format_progress(progress: Option<f64>) -> String {
    progress.map(|p| format!("{:.1}%", p)).unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn print_record(record: &SimulationRecord) {
    println!("\n{} {}", "Simulation".bold(), record.id);
    println!("  Name:      {}", record.name);
    println!("  Project:   {}", record.project_id);
    println!("  Load data: {}", paint(record.load_data_status));
    println!("  BMP:       {}", paint(record.bmp_status));
    println!(
        "  CSTR:      {} ({})",
        paint(record.cstr_status),
        format_progress(record.cstr_progress)
    );

    if let Some(outcomes) = record.cstr_result.as_ref().and_then(|r| r.substrates()) {
        for outcome in outcomes {
            match serde_json::to_value(outcome) {
                Ok(value) => println!(
                    "    [{}] {} {}",
                    outcome.index(),
                    value["name"].as_str().unwrap_or_default(),
                    value["status"].as_str().unwrap_or_default()
                ),
                Err(_) => println!("    [{}]", outcome.index()),
            }
        }
    } else if let Some(text) = record.cstr_result.as_ref().and_then(|r| r.error()) {
        println!("    {}", text.red());
    }
    println!("  Updated:   {}", record.updated_at.to_rfc3339());
}
