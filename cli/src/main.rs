use clap::Parser;
mod app;
mod commands;

use commands::cli::{Args, Commands};
use godata_core::config::{self, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            1
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> anyhow::Result<i32> {
    let args = Args::parse();
    let cfg = config::load_default()?;
    init_tracing(&cfg.logging)?;

    let code = match &args.command {
        Commands::Collect(collect_args) => {
            app::run_collect(collect_args, &cfg, args.quiet).await?
        }
        Commands::Documents(documents_args) => {
            app::run_documents(documents_args, &cfg).await?
        }
    };
    Ok(code)
}

fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    if !cfg.enabled {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));

    let console_layer = cfg.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let file_layer = if cfg.file {
        let directory = cfg.directory.clone().unwrap_or_else(|| "logs".to_string());
        let appender = tracing_appender::rolling::daily(directory, "godata.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}
