use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use redline::config::RedlineConfig;
use redline::mutex::{DistributedMutex, Guarded};
use redline::queue::FifoQueue;
use redline::ratelimit::SlidingWindowLimiter;
use redline::store::RedisStore;

/// Drive Redline's coordination primitives against a Redis server.
#[derive(Debug, Parser)]
#[command(name = "redline", version, about)]
struct Cli {
    /// YAML configuration file (REDLINE_* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run rate-limited attempts for a subject
    Limit {
        /// Rate-limited subject
        subject: String,
        /// Number of attempts
        #[arg(long, default_value_t = 10)]
        attempts: u32,
        /// Pause between attempts in milliseconds
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Hold a lock for a while, or report that it is busy
    Lock {
        /// Lock key
        key: String,
        /// Lock TTL in milliseconds
        #[arg(long, default_value_t = 5000)]
        ttl_ms: u64,
        /// How long the guarded body runs in milliseconds
        #[arg(long, default_value_t = 2000)]
        hold_ms: u64,
    },
    /// Publish a JSON message
    Publish {
        /// Message as JSON
        message: String,
    },
    /// Consume messages
    Consume {
        /// Keep polling until interrupted
        #[arg(long)]
        follow: bool,
        /// Poll interval in milliseconds when following
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = RedlineConfig::load(cli.config.as_deref())?;
    info!(store = %config.store.url(), "Configuration loaded");

    let store = Arc::new(RedisStore::connect(&config.store).await?);

    match cli.command {
        Command::Limit {
            subject,
            attempts,
            interval_ms,
        } => {
            let limiter = SlidingWindowLimiter::new(store, config.rate_limiting)?;
            for attempt in 1..=attempts {
                let admission = limiter.check(&subject).await?;
                if admission.admitted {
                    println!("{attempt}: admitted ({} remaining)", admission.remaining);
                } else {
                    println!("{attempt}: rate limit exceeded");
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
        }
        Command::Lock {
            key,
            ttl_ms,
            hold_ms,
        } => {
            let mutex = DistributedMutex::new(store, config.mutex);
            let outcome = mutex
                .run_exclusive(&key, Duration::from_millis(ttl_ms), || async {
                    println!("{key}: acquired, working for {hold_ms}ms");
                    tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                })
                .await?;
            match outcome {
                Guarded::Ran(()) => println!("{key}: released"),
                Guarded::Busy => println!("{key}: held by another process"),
            }
        }
        Command::Publish { message } => {
            let value: serde_json::Value = serde_json::from_str(&message)?;
            let queue = FifoQueue::new(store, config.queue);
            if queue.publish(&value).await? {
                println!("published to {}", queue.name());
            } else {
                anyhow::bail!("message was not published");
            }
        }
        Command::Consume { follow, poll_ms } => {
            let queue: FifoQueue<_, serde_json::Value> = FifoQueue::new(store, config.queue);
            if follow {
                tokio::select! {
                    result = follow_queue(&queue, Duration::from_millis(poll_ms)) => result?,
                    _ = shutdown_signal() => {}
                }
            } else {
                match queue.consume().await? {
                    Some(message) => println!("{message}"),
                    None => println!("queue {} is empty", queue.name()),
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Print messages as they arrive. Consume never blocks, so poll.
async fn follow_queue(
    queue: &FifoQueue<RedisStore, serde_json::Value>,
    poll: Duration,
) -> anyhow::Result<()> {
    loop {
        match queue.consume().await? {
            Some(message) => println!("{message}"),
            None => tokio::time::sleep(poll).await,
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping");
        }
    }
}
