// QuotaGuard - Main Entry Point
//
// Command line front end over a file-backed quota store:
// - serve: HTTP API plus the tier-expiry sweeper
// - administrative commands to register subjects and resources
// - status, consume, history, stats and sweep against the same state
//
// Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use quotaguard::engine::spawn_tier_sweeper;
use quotaguard::logging::LogLevel;
use quotaguard::{
    api, metrics, ConsumptionOutcome, ConsumptionRequest, Config, FileStore, QuotaAccount,
    QuotaService, Resource, ResourceId, SourceChannel, SubjectId, SubjectIdentity,
};

/// Exit code for a consumption refused by quota
const EXIT_DENIED: u8 = 2;

/// QuotaGuard: quota enforcement and usage accounting
#[derive(Parser, Debug)]
#[command(name = "quotaguard")]
#[command(author = "QuotaGuard Contributors")]
#[command(version)]
#[command(about = "Tiered, time-windowed download quota engine", long_about = None)]
struct Args {
    /// Configuration file (defaults to $QUOTAGUARD_CONFIG or ./quotaguard.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// State snapshot, overriding storage.state_path
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on, overriding server.port
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind, overriding server.bind_address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Register a subject with a fresh free-tier account
    RegisterSubject {
        subject: String,

        /// Register the subject as not yet verified
        #[arg(long)]
        unverified: bool,
    },
    /// Add a resource to the catalog
    RegisterResource {
        resource: String,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "general")]
        category: String,

        /// Where the resource is fetched from
        #[arg(long)]
        location: String,
    },
    /// Grant premium for a number of days from now
    GrantPremium {
        subject: String,

        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Show current quota status
    Status { subject: String },
    /// Consume one unit of quota for a resource
    Consume {
        subject: String,
        resource: String,

        /// Source channel (web, mobile, api, bot)
        #[arg(long, default_value = "api")]
        channel: SourceChannel,
    },
    /// Show consumption history, newest first
    History {
        subject: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },
    /// Usage statistics for one subject, or global when omitted
    Stats { subject: Option<String> },
    /// Downgrade premium tiers that have expired
    Sweep,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(state) = args.state {
        config.storage.state_path = state;
    }
    if args.verbose {
        config.logging.level = LogLevel::Debug;
    }
    config.logging.init()?;

    let store = Arc::new(
        FileStore::open(&config.storage.state_path).with_context(|| {
            format!(
                "Failed to open state at {}",
                config.storage.state_path.display()
            )
        })?,
    );
    let service = Arc::new(QuotaService::new(
        store.clone(),
        &config.quota,
        config.engine.clone(),
    )?);

    match args.command {
        Commands::Serve { port, bind } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            metrics::init().context("Failed to initialize metrics")?;
            if config.sweep.enabled {
                info!(
                    "Tier sweeper running every {}s",
                    config.sweep.interval_secs
                );
                spawn_tier_sweeper(service.clone(), config.sweep.interval());
            }
            api::serve(service, config.server.socket_addr()?).await?;
        }
        Commands::RegisterSubject {
            subject,
            unverified,
        } => {
            let subject = SubjectId::parse(subject)?;
            let identity = if unverified {
                SubjectIdentity::unverified(subject.clone())
            } else {
                SubjectIdentity::verified(subject.clone())
            };
            let account =
                QuotaAccount::new(subject, service.now(), service.evaluator().policy());
            store.register_subject(identity, account.clone()).await?;
            print_json(&account)?;
        }
        Commands::RegisterResource {
            resource,
            title,
            category,
            location,
        } => {
            let resource = Resource::new(ResourceId::parse(resource)?, title, category, location);
            store.register_resource(resource.clone()).await?;
            print_json(&resource)?;
        }
        Commands::GrantPremium { subject, days } => {
            let subject = SubjectId::parse(subject)?;
            let expiry = Duration::try_days(i64::from(days))
                .and_then(|span| service.now().checked_add_signed(span))
                .with_context(|| format!("--days {} is out of range", days))?;
            print_json(&service.grant_premium(&subject, expiry).await?)?;
        }
        Commands::Status { subject } => {
            let subject = SubjectId::parse(subject)?;
            print_json(&service.status(&subject).await?)?;
        }
        Commands::Consume {
            subject,
            resource,
            channel,
        } => {
            let request =
                ConsumptionRequest::new(SubjectId::parse(subject)?, ResourceId::parse(resource)?)
                    .via(channel);
            let outcome = service.consume(request).await?;
            print_json(&outcome)?;
            if matches!(outcome, ConsumptionOutcome::Denied { .. }) {
                return Ok(ExitCode::from(EXIT_DENIED));
            }
        }
        Commands::History {
            subject,
            page,
            page_size,
        } => {
            let subject = SubjectId::parse(subject)?;
            print_json(&service.history(&subject, page, page_size).await?)?;
        }
        Commands::Stats { subject } => match subject {
            Some(subject) => {
                let subject = SubjectId::parse(subject)?;
                print_json(&service.subject_stats(&subject).await?)?;
            }
            None => print_json(&service.global_stats().await?)?,
        },
        Commands::Sweep => {
            print_json(&service.sweep_expired_tiers().await?)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", text);
    Ok(())
}
