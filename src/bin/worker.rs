use acadrec::services::SweepReport;
use acadrec::{init_tracing, AppState, Config};
use anyhow::Result;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Which batch sweep to run: vectors, similarities or all.
    #[arg(short, long, default_value = "all")]
    worker_type: String,

    /// Shard of the sweep this process covers.
    #[arg(long, default_value_t = 0)]
    shard_index: u64,

    /// Total number of cooperating shards.
    #[arg(long, default_value_t = 1)]
    shard_count: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    if args.shard_index >= args.shard_count {
        return Err(anyhow::anyhow!(
            "shard index {} out of range for {} shards",
            args.shard_index,
            args.shard_count
        ));
    }

    info!(
        worker_type = %args.worker_type,
        shard_index = args.shard_index,
        shard_count = args.shard_count,
        "starting acadrec worker"
    );

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    let state = AppState::new(config).await?;

    match args.worker_type.as_str() {
        "vectors" => {
            let report = state
                .feature_builder
                .build_shard(args.shard_index, args.shard_count)
                .await?;
            log_report("feature vector sweep", &report);
        }
        "similarities" => {
            let report = state
                .similarity_engine
                .calculate_shard(args.shard_index, args.shard_count)
                .await?;
            log_report("similarity sweep", &report);
        }
        "all" => {
            let report = state
                .feature_builder
                .build_shard(args.shard_index, args.shard_count)
                .await?;
            log_report("feature vector sweep", &report);

            let report = state
                .similarity_engine
                .calculate_shard(args.shard_index, args.shard_count)
                .await?;
            log_report("similarity sweep", &report);
        }
        other => {
            return Err(anyhow::anyhow!("unknown worker type: {}", other));
        }
    }

    Ok(())
}

fn log_report(name: &str, report: &SweepReport) {
    info!(
        processed = report.processed,
        skipped = report.total_skipped(),
        "{name} finished"
    );
    for (reason, count) in &report.skipped {
        info!(%reason, count, "{name} skip breakdown");
    }
}
