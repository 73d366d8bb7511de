//! Memograph CLI.
//!
//! Runs a resolution server, pings one, or validates a configuration
//! file. Settings come from a `key = value` config file; command-line
//! arguments override file values where both exist.

mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use memograph::catalog::{SeriCatalog, SeriRegistry};
use memograph::config::{keys, Config};
use memograph::context::{DomainRegistry, Resources, TestingDomain};
use memograph::remote::{serve, RemoteServer, RemoteProxy, TcpProxy};
use memograph::request::{CachingLevel, FunctionSpec, RequestUuid};
use memograph::resolve::ResolveError;
use memograph::value::{Value, ValueKind};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "memograph", version, about = "Compute-caching runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a resolution server.
    Serve {
        /// Listen address.
        #[arg(long, default_value = "127.0.0.1:4750")]
        addr: String,

        /// Configuration file (`key = value` lines).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Ping a running server and print its version.
    Ping {
        /// Server address.
        #[arg(long, default_value = "127.0.0.1:4750")]
        addr: String,
    },

    /// Validate a configuration file and list its keys.
    CheckConfig {
        /// Configuration file to validate.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve { addr, config } => serve_command(&addr, config).await,
        Commands::Ping { addr } => ping_command(&addr).await,
        Commands::CheckConfig { file } => check_config_command(&file),
    }
}

async fn serve_command(addr: &str, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let _logging = memograph::logging::init_logging(
        memograph::logging::default_log_dir(),
        memograph::logging::default_log_file(),
    )?;

    let config = match config_path {
        Some(path) => Config::from_str(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    let testing = config.get_bool(keys::TESTING)?.unwrap_or(false);

    let resources = Resources::new(config)?;
    let domains = DomainRegistry::global().clone();
    domains.register(Arc::new(TestingDomain));

    let registry = SeriRegistry::global().clone();
    // Keep the demo catalog registered for the server's lifetime.
    let _demo_catalog = if testing {
        Some(demo_catalog(&registry)?)
    } else {
        None
    };

    let server = RemoteServer::new(resources, domains, registry)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, testing, "memograph server ready");
    serve(listener, server).await?;
    Ok(())
}

async fn ping_command(addr: &str) -> Result<(), CliError> {
    let proxy = TcpProxy::connect("cli", addr).await?;
    let version = proxy.ping().await?;
    println!("memograph server {} at {}", version, addr);
    Ok(())
}

fn check_config_command(file: &PathBuf) -> Result<(), CliError> {
    let config = Config::from_str(&std::fs::read_to_string(file)?)?;
    let mut config_keys = config.config_keys();
    config_keys.sort();
    println!("{} valid ({} keys)", file.display(), config_keys.len());
    for key in config_keys {
        println!("  {}", key);
    }
    Ok(())
}

/// Request classes available on testing servers.
fn demo_catalog(registry: &SeriRegistry) -> Result<SeriCatalog, CliError> {
    let mut catalog = SeriCatalog::new_in(registry);
    let add = FunctionSpec::plain(ValueKind::Integer, |args: Vec<Value>| {
        match (&args[0], &args[1]) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
            _ => Err(ResolveError::Computation("expected integers".into())),
        }
    })
    .uuid(RequestUuid::new("demo/add@v1")?)
    .caching(CachingLevel::Memory)
    .build()?;
    catalog.register_function(add)?;
    Ok(catalog)
}
