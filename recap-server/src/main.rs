use clap::Parser;
use recap_core::RecapConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use recap_server::context::AppContext;
use recap_server::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "recap.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match RecapConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let ctx = match AppContext::connect(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match &ctx.pool {
            Some(pool) => match recap_core::db::health_check(pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            },
            None => println!("✅ In-memory store ready"),
        }
        println!("✅ Summary generator: {}", ctx.generator.name());
        println!("✅ Recap health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if ctx.config.http.enabled {
        let http_ctx = ctx.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = recap_server::http::start_http_server(http_ctx, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    tracing::info!(
        store = ctx.store_name(),
        generator = ctx.generator.name(),
        inline_generation = ctx.config.cadence.inline_generation,
        "Recap server starting"
    );

    let socket_path = server::resolve_socket_path(&ctx.config.service.socket_path)?;
    server::run_unix_server(&socket_path, ctx, tx.subscribe()).await?;

    Ok(())
}
