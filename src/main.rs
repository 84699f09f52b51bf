use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use karma_operator::config::{render, Settings};
use karma_operator::endpoint::ProtocolVersion;
use karma_operator::relation::{ActiveRelations, EndpointAggregator, RelationData};
use karma_operator::workload::{HealthProbe, KarmaClient, TlsMaterial};
use karma_operator::Error;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log output format
    #[arg(long, env = "KARMA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the Karma config for a relation snapshot
    Render(RenderArgs),
    /// Check health and version of a running dashboard
    Probe(ProbeArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// JSON array of relation snapshots; every listed relation counts as joined
    #[arg(long)]
    relations: PathBuf,

    /// YAML settings file; flags below override it
    #[arg(long, env = "KARMA_SETTINGS")]
    settings: Option<PathBuf>,

    #[arg(long, env = "KARMA_PORT")]
    port: Option<u16>,

    /// Dashboard relation protocol generation (v0 or v1)
    #[arg(long, env = "KARMA_PROTOCOL")]
    protocol: Option<ProtocolVersion>,

    #[arg(long, env = "KARMA_WEB_EXTERNAL_URL")]
    web_external_url: Option<String>,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Base URL of the dashboard, including any path prefix
    #[arg(long, env = "KARMA_URL", default_value = "http://localhost:8080/")]
    url: String,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "KARMA_PROBE_TIMEOUT_MS", default_value_t = 2000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_tracing(args.log_format);

    match args.command {
        Commands::Version => {
            println!("karma-operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Render(render_args) => run_render(render_args).await,
        Commands::Probe(probe_args) => run_probe(probe_args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn load_settings(args: &RenderArgs) -> Result<Settings, Error> {
    let mut settings = match &args.settings {
        Some(path) => serde_yaml::from_str(&tokio::fs::read_to_string(path).await?)?,
        None => Settings::default(),
    };
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(protocol) = args.protocol {
        settings.protocol = protocol;
    }
    if let Some(url) = &args.web_external_url {
        settings.web_external_url = Some(url.clone());
    }
    settings.validate()?;
    Ok(settings)
}

async fn run_render(args: RenderArgs) -> Result<(), Error> {
    let settings = load_settings(&args).await?;
    let relations: Vec<RelationData> =
        serde_json::from_str(&tokio::fs::read_to_string(&args.relations).await?)?;

    let mut active = ActiveRelations::default();
    for relation in &relations {
        active.on_joined(relation.id);
    }

    let aggregate =
        EndpointAggregator::new(settings.protocol.schema(), &active).aggregate(&relations);
    if !aggregate.is_valid() {
        warn!("No usable Alertmanager endpoint in {}", args.relations.display());
    }

    let rendered = render(&aggregate, &settings, &TlsMaterial::Disabled)?;
    info!(
        "Rendered {} endpoint(s), hash {}",
        aggregate.len(),
        rendered.hash
    );
    print!("{}", rendered.document);
    Ok(())
}

async fn run_probe(args: ProbeArgs) -> Result<(), Error> {
    let client = KarmaClient::new(&args.url, Duration::from_millis(args.timeout_ms))?;

    client.check_health().await?;
    println!("{}: healthy", client.base_url());

    match client.version().await {
        Ok(version) => println!("version: {version}"),
        Err(e) => warn!("Version unknown: {}", e),
    }
    Ok(())
}
