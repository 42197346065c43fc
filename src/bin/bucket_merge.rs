use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use bucket_merge::bucket::DEFAULT_BLOCK_SIZE;
use bucket_merge::config::{
    DEFAULT_COARSE_EVERY, DEFAULT_DELAY_MINUTES, DEFAULT_INTERVAL_MINUTES,
    DEFAULT_PROBE_BUFFER_SIZE, DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITER_QUEUE_DEPTH,
};
use bucket_merge::{LogMerger, MergeConfig};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(name = "bucket-merge")]
#[command(about = "Merge time-ordered access logs into per-minute and coarse time buckets")]
struct Cli {
    /// Source log files, each already sorted by time
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Output with a header for every minute
    #[arg(long)]
    full: PathBuf,

    /// Output with a header every --coarse-every minutes
    #[arg(long)]
    coarse: PathBuf,

    /// Minutes of cross-source skew tolerated before a bucket is flushed
    #[arg(long, default_value_t = DEFAULT_DELAY_MINUTES)]
    delay: u32,

    /// Minutes the shared read threshold advances per round
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MINUTES)]
    interval: u32,

    /// Bucket growth step in bytes
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Bytes per source read
    #[arg(long, default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    read_buffer: usize,

    /// Read buffer used to find each source's first timestamp
    #[arg(long, default_value_t = DEFAULT_PROBE_BUFFER_SIZE)]
    probe_buffer: usize,

    /// Buckets per header in the coarse output
    #[arg(long, default_value_t = DEFAULT_COARSE_EVERY)]
    coarse_every: u64,

    /// Pending write units per output before merging waits
    #[arg(long, default_value_t = DEFAULT_WRITER_QUEUE_DEPTH)]
    queue_depth: usize,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let started = Instant::now();

    let mut config = MergeConfig::new(cli.sources, cli.full, cli.coarse);
    config.delay_minutes = cli.delay;
    config.interval_minutes = cli.interval;
    config.block_size = cli.block_size;
    config.read_buffer_size = cli.read_buffer;
    config.probe_buffer_size = cli.probe_buffer;
    config.coarse_every = cli.coarse_every;
    config.writer_queue_depth = cli.queue_depth;

    let stats = LogMerger::new(config)
        .run()
        .await
        .context("merge failed")?;
    info!("Total time: {}ms", started.elapsed().as_millis());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "merged sources={} lines={} late={} minutes={} rounds={} full_bytes={} coarse_bytes={}",
            stats.sources.len(),
            stats.lines,
            stats.late_lines,
            stats.buckets,
            stats.rounds,
            stats.full_bytes,
            stats.coarse_bytes
        );
    }
    Ok(())
}
