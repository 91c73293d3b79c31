mod cli;
mod commands;
mod crawl;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc: glibc malloc holds on to memory under high fetch concurrency
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use sitemapper_core::AppConfig;

use crate::cli::{Cli, Commands};
use crate::crawl::{run_crawl, CrawlArgs};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // argument errors exit 1, --help/--version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    // Environment overrides, then CLI flags on top
    if let Ok(v) = std::env::var("SITEMAPPER_CONCURRENCY") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 && n <= 512 {
                config.general.concurrency = n;
            }
        }
    }
    if let Ok(v) = std::env::var("SITEMAPPER_MAX_RETRIES") {
        if let Ok(n) = v.parse::<u32>() {
            config.general.max_retries = n;
        }
    }

    match cli.command {
        Commands::Crawl {
            seeds,
            additional_hosts,
            follow_all,
            content_only,
            preserve_query_order,
            concurrency,
            max_retries,
            cache_dir,
            body_dir,
            extractor,
            extractor_dir,
            output,
            failed_output,
        } => {
            if let Some(n) = concurrency {
                config.general.concurrency = n.max(1);
            }
            if let Some(n) = max_retries {
                config.general.max_retries = n;
            }
            if let Some(dir) = cache_dir {
                config.cache.dir = Some(dir);
            }
            if let Some(dir) = body_dir {
                config.cache.body_dir = Some(dir);
            }
            if let Some(cmd) = extractor {
                config.extractor.command = Some(cmd);
            }
            if let Some(dir) = extractor_dir {
                config.extractor.output_dir = Some(dir);
            }
            if let Some(path) = output {
                config.general.output = path;
            }
            if let Some(path) = failed_output {
                config.general.failed_output = path;
            }
            run_crawl(
                config,
                CrawlArgs {
                    seeds,
                    additional_hosts,
                    follow_all,
                    content_only,
                    preserve_query_order,
                },
            )
            .await?;
        }
        Commands::Recheck { file, concurrency } => {
            if let Some(n) = concurrency {
                config.general.concurrency = n.max(1);
            }
            commands::recheck::run(config, &file).await?;
        }
    }

    Ok(())
}
