//! cmstore CLI - Command-line interface for the component model store

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use cmstore::config::{self, StoreConfig};
use cmstore::resolver::ReferenceResolver;
use cmstore::storage::BackingStore;
use cmstore::{ComponentModel, ModelRepository, PropertySchema, SqliteStore, ui};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cmstore")]
#[command(version)]
#[command(about = "Component Model Store - versioned component models with reference resolution")]
#[command(long_about = r#"
cmstore persists component models identified by domain, name and version,
resolving references between models so that every stored model is complete.

Example usage:
  cmstore list --domain assembly
  cmstore fetch --domain assembly --name arm --version 1.0
  cmstore store model.json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Working graph (overrides config)
    #[arg(short, long, global = true)]
    graph: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the models of a domain
    List {
        #[arg(long)]
        domain: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the stored versions of a model
    Versions {
        #[arg(long)]
        domain: String,

        #[arg(long)]
        name: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fetch one model as JSON
    Fetch {
        #[arg(long)]
        domain: String,

        #[arg(long)]
        name: String,

        /// Version to fetch (greatest stored version when omitted)
        #[arg(long)]
        version: Option<String>,

        /// Expand sub-models only to the configured depth
        #[arg(long)]
        limited: bool,
    },

    /// Store a model tree from a JSON file ("-" reads stdin)
    Store {
        file: PathBuf,
    },

    /// Check a model tree against the property schema without storing it
    Validate {
        file: PathBuf,
    },

    /// Show the declared model properties
    Schema,

    /// Show statistics about the working graph
    Stats,

    /// Write a config file with the current settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let schema = PropertySchema::component_model();

    match cli.command {
        Commands::Schema => {
            ui::header("ComponentModel properties");
            println!("{}", ui::schema_table(schema.declared_properties()));
        }

        Commands::Validate { ref file } => {
            let model = read_model(file)?;
            let repo = open_repository(&cli, &config, schema)?;
            repo.validate(&model)?;
            ui::success(&format!("{} is valid", model.primary_uri()?));
        }

        Commands::List { ref domain, json } => {
            let repo = open_repository(&cli, &config, schema)?;
            let models = repo.list_models(domain)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else if models.is_empty() {
                ui::warn(&format!("No models in domain {}", domain.to_uppercase()));
            } else {
                ui::header(&format!("Models in {}", domain.to_uppercase()));
                println!("{}", ui::models_table(&models));
            }
        }

        Commands::Versions { ref domain, ref name, json } => {
            let repo = open_repository(&cli, &config, schema)?;
            let versions = repo.list_versions(domain, name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else if versions.is_empty() {
                ui::warn(&format!("No versions of {}/{}", domain.to_uppercase(), name));
            } else {
                ui::header(&format!("Versions of {}/{}", domain.to_uppercase(), name));
                println!("{}", ui::versions_table(&versions));
            }
        }

        Commands::Fetch { ref domain, ref name, ref version, limited } => {
            let repo = open_repository(&cli, &config, schema)?;
            let model = repo.fetch_model(domain, name, version.as_deref(), limited)?;
            println!("{}", model.to_json_pretty()?);
        }

        Commands::Store { ref file } => {
            let model = read_model(file)?;
            let mut repo = open_repository(&cli, &config, schema)?;
            let uris = repo.store_model(model)?;
            ui::success(&format!("Stored {} units", uris.len()));
            ui::section("Units");
            for uri in uris {
                println!("  {} {}", ui::Icons::LINK, uri);
            }
        }

        Commands::Stats => {
            let repo = open_repository(&cli, &config, schema)?;
            let stats = repo.store().stats()?;
            ui::header(&format!("{} Store statistics", ui::Icons::STATS));
            if let Some(path) = repo.store().path() {
                ui::info(&format!("{} Database", ui::Icons::DATABASE), &path.display().to_string());
            }
            println!("{}", ui::stats_table(&stats));
        }

        Commands::Init { force } => {
            let settings = StoreConfig {
                database: Some(database_path(&cli, &config).display().to_string()),
                graph: cli.graph.clone().or_else(|| config.graph.clone()),
                ..config.clone()
            };
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            config::write_config(&path, &settings, force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

fn database_path(cli: &Cli, config: &StoreConfig) -> PathBuf {
    cli.database.clone().unwrap_or_else(|| config.database_path())
}

fn open_repository(
    cli: &Cli,
    config: &StoreConfig,
    schema: PropertySchema,
) -> anyhow::Result<ModelRepository<SqliteStore>> {
    let path = database_path(cli, config);
    tracing::debug!("Opening {}", path.display());

    let mut store = SqliteStore::open(&path)?;
    if let Some(timeout) = config.busy_timeout() {
        store.set_busy_timeout(timeout)?;
    }
    if let Some(graph) = cli.graph.as_deref().or(config.graph.as_deref()) {
        store.set_working_graph(graph);
    }

    let resolver = config
        .max_reference_hops
        .map(ReferenceResolver::with_max_hops)
        .unwrap_or_default();

    let mut repo = ModelRepository::new(store, schema).with_resolver(resolver);
    if let Some(depth) = config.fetch_depth_limit {
        repo = repo.with_fetch_depth_limit(depth);
    }
    Ok(repo)
}

fn read_model(file: &Path) -> anyhow::Result<ComponentModel> {
    let mut contents = String::new();
    if file == Path::new("-") {
        std::io::stdin().read_to_string(&mut contents)?;
    } else {
        contents = std::fs::read_to_string(file)?;
    }
    Ok(ComponentModel::from_json(&contents)?)
}
