use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clickstat::analytics::{ClickAggregator, Enricher};
use clickstat::config::Config;
use clickstat::models::GLOBAL_SCOPE;
use clickstat::storage::{self, LockManager, LockOptions};

#[derive(Parser)]
#[command(name = "clickstat-admin")]
#[command(about = "Click counter admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the counters of a site, or the global counters
    Counters {
        /// Site identifier (defaults to the global scope)
        #[arg(long)]
        site: Option<String>,
    },
    /// Record a click and print the enriched result
    Click {
        site: String,
        resource: String,
        #[arg(long, default_value = "")]
        ip: String,
        #[arg(long, default_value = "")]
        user_agent: String,
    },
    /// Resolve the location of an IP address
    LookupIp { ip: String },
    /// Show how a user agent string is classified
    ParseUa { user_agent: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let enricher = Enricher::from_config(&config.analytics)?;

    match cli.command {
        Commands::Counters { site } => {
            let (store, _) = storage::connect(&config.store).await?;
            let scope = site.as_deref().unwrap_or(GLOBAL_SCOPE);
            let counters = store
                .get_all(scope)
                .await
                .with_context(|| format!("Failed to read counters of {}", scope))?;

            if counters.is_empty() {
                println!("No counters for '{}'.", scope);
            } else {
                println!("{:<60} {}", "Field", "Count");
                println!("{}", "-".repeat(72));
                for (field, count) in counters {
                    println!("{:<60} {}", field, count);
                }
            }
        }
        Commands::Click {
            site,
            resource,
            ip,
            user_agent,
        } => {
            let (store, lock_backend) = storage::connect(&config.store).await?;
            let aggregator = ClickAggregator::new(
                enricher,
                store,
                LockManager::new(lock_backend, LockOptions::from(&config.lock)),
                config.analytics.track_ip,
            );
            let event = aggregator
                .process_click(&site, &resource, &ip, &user_agent)
                .await?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Commands::LookupIp { ip } => match enricher.locate(&ip) {
            Some(location) => println!("{}", serde_json::to_string_pretty(&location)?),
            None => println!("⚠ No location found for '{}'", ip),
        },
        Commands::ParseUa { user_agent } => {
            let click = clickstat::models::ClickEvent::new("-", "-", "", user_agent)?;
            let event = enricher.enrich(click);
            println!("{:<16} {}", "family", event.browser_family);
            println!("{:<16} {}", "browser", event.browser);
            println!("{:<16} {}", "os", event.os);
            println!("{:<16} {}", "platform", event.platform);
            println!("{:<16} {}", "bot", event.bot);
            println!("{:<16} {}", "mobile", event.mobile);
        }
    }

    Ok(())
}
