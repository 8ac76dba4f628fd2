use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use modindex::graph::DepLevel;
use modindex::{Config, IndexService};

/// Crawl-and-cache index of versioned modules
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "MODINDEX_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (defaults to ~/.modindex/index.db)
    #[arg(long, env = "MODINDEX_DATABASE")]
    database: Option<PathBuf>,

    /// Module registry base URL
    #[arg(long, env = "MODINDEX_REGISTRY")]
    registry: Option<String>,

    /// Registry serving the standard library module
    #[arg(long, env = "MODINDEX_STDLIB_REGISTRY")]
    stdlib_registry: Option<String>,

    /// Ask the registry not to fetch modules it has not cached
    #[arg(long, env = "MODINDEX_FETCH_DISABLED")]
    fetch_disabled: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl the latest version of a module
    Crawl { module: String },
    /// Show a package, crawling its module if it is not indexed yet
    Get {
        import_path: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        platform: Option<String>,
        /// How long to wait for an on-demand crawl
        #[arg(long)]
        wait_ms: Option<u64>,
    },
    /// Full-text search over indexed packages
    Search { query: String },
    /// Packages importing a path
    Importers { import_path: String },
    /// Import graph of a package
    Graph {
        import_path: String,
        /// all, hide-deps or hide-all
        #[arg(long, default_value = "all")]
        level: DepLevel,
    },
    /// Packages of a module version
    Subpackages {
        module: String,
        version: String,
        #[arg(long)]
        prefix: Option<String>,
        /// Include packages behind internal path segments
        #[arg(long)]
        internal: bool,
    },
    /// Block a path prefix and delete everything indexed under it
    Block { prefix: String },
    Unblock { prefix: String },
    /// Keep re-crawling the least recently updated module
    Sweep {
        /// Sweep a single module and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = load_config(&args)?;
    let service = IndexService::open(&config).await.context("failed to open index")?;

    let outcome = run(&service, args.command).await;
    service.close().await;
    if let Err(e) = outcome {
        eprintln!("{:?}: {}", e.response_class(), e);
        process::exit(1);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(database) = &args.database {
        config.database_path = Some(database.clone());
    }
    if let Some(registry) = &args.registry {
        config.registry_url = registry.clone();
    }
    if let Some(stdlib) = &args.stdlib_registry {
        config.stdlib_registry_url = Some(stdlib.clone());
    }
    config.fetch_disabled |= args.fetch_disabled;
    Ok(config)
}

async fn run(service: &IndexService, command: Commands) -> modindex::Result<()> {
    match command {
        Commands::Crawl { module } => print_json(&service.crawl(&module).await?),
        Commands::Get {
            import_path,
            version,
            platform,
            wait_ms,
        } => {
            let page = service
                .get_page(
                    &import_path,
                    version.as_deref(),
                    platform.as_deref(),
                    wait_ms.map(Duration::from_millis),
                )
                .await?;
            print_json(&page)
        }
        Commands::Search { query } => print_json(&service.search(&query).await?),
        Commands::Importers { import_path } => print_json(&service.importers(&import_path).await?),
        Commands::Graph { import_path, level } => {
            print_json(&service.import_graph(&import_path, level).await?)
        }
        Commands::Subpackages {
            module,
            version,
            prefix,
            internal,
        } => print_json(
            &service
                .sub_packages(&module, &version, prefix.as_deref(), internal)
                .await?,
        ),
        Commands::Block { prefix } => {
            service.block(&prefix).await?;
            println!("blocked {prefix}");
            Ok(())
        }
        Commands::Unblock { prefix } => {
            if service.unblock(&prefix).await? {
                println!("unblocked {prefix}");
            } else {
                println!("{prefix} was not blocked");
            }
            Ok(())
        }
        Commands::Sweep { once: true } => print_json(&service.sweeper().tick().await?),
        Commands::Sweep { once: false } => {
            sweep_until_interrupted(service).await;
            Ok(())
        }
    }
}

async fn sweep_until_interrupted(service: &IndexService) {
    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        tracing::info!("Interrupted, stopping sweeper");
        stop.cancel();
    });

    let ticker = tokio::time::interval(service.sweep_interval());
    service.sweeper().run(ticker, cancel).await;
}

fn print_json<T: Serialize>(value: &T) -> modindex::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
