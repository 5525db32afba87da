mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use pagewatch::config::AppConfig;
use pagewatch::db::Database;
use pagewatch::monitor::{check_site, Monitor};
use pagewatch::render::connect_renderer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A broken configuration aborts before any site is visited.
    let config = AppConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let monitor = Monitor::from_config(config).await?;
            let summary = monitor.run().await;
            monitor.shutdown().await;
            println!(
                "Checked {} site(s): {} new item(s), {} failed site(s)",
                summary.sites.len(),
                summary.notified(),
                summary.failed_sites()
            );
        }
        Commands::Check { site } => {
            let renderer = connect_renderer(&config.browser).await?;
            let result = check_site(&config, renderer.as_ref(), &site).await;
            renderer.close().await?;
            let extraction = result?;
            for item in &extraction.items {
                println!("{}\n  link:  {}", item.title, item.link);
                if let Some(image) = &item.image {
                    println!("  image: {}", image);
                }
            }
            for dropped in &extraction.dropped {
                println!("dropped element #{}: {}", dropped.index, dropped.reason);
            }
            println!("{} item(s), {} dropped", extraction.items.len(), extraction.dropped.len());
        }
        Commands::History { site, limit } => {
            let db = Database::open(&config.database).await?;
            let records = db.recent(site.as_deref(), limit).await?;
            for r in &records {
                let when = r.timestamp.as_deref().unwrap_or("-");
                println!("{}  [{}] {}\n  {}", when, r.site_name, r.title, r.url);
            }
            println!("{} record(s) in history", db.count(site.as_deref()).await?);
            db.close().await;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
