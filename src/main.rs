use anyhow::{anyhow, Result};
use is_terminal::IsTerminal;
use sinkhole::cache::QuestionSink;
use sinkhole::error::Error::DNSError;
use sinkhole::{blocklist, Caches, Config, SharedConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("sinkhole".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    tracing_init(&config);

    let caches = Caches::new(&config);
    let domains = blocklist::load(&config).await?;
    tracing::info!("blocking {} names", domains.len());
    caches.blocked.reload(domains);

    let questions = QuestionSink::spawn(caches.questions.clone(), config.question_cache_cap);
    tokio::spawn(purge_expired(caches.clone()));

    tracing::info!("DNS listening on UDP {}", &config.dns_udp_bind_addr);
    tracing::info!("DNS listening on TCP {}", &config.dns_tcp_bind_addr);
    let dns_server = sinkhole::dns::new(config.clone(), &caches, questions).await?;
    let dns_handle = tokio::spawn(dns_server.block_until_done());

    tracing::info!("API listening on {}", &config.api_bind_addr);
    let api_server = sinkhole::api::new(config.clone(), caches.clone());
    let api_handle = tokio::spawn(api_server);

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        Ok(dns_res) = dns_handle => {
            if let Err(err) = dns_res {
                return Err(DNSError(err).into())
            }
        }
        Ok(api_res) = api_handle => {
            if let Err(err) = api_res {
                return Err(err.into())
            }
        }
    }
    tracing::info!("goodbye");
    Ok(())
}

/// Drops expired response cache entries that were never read again.
async fn purge_expired(caches: Caches) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        let purged = caches.positive.purge_expired() + caches.negative.purge_expired();
        if purged > 0 {
            tracing::debug!("purged {purged} expired cache entries");
        }
    }
}

fn tracing_init(config: &Config) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stdout().is_terminal()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sinkhole={}", config.log_level).into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            Ok(Arc::new(config))
        }
    }
}
