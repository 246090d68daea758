use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use daily_log_sink::init::{init_tracing_with_config, BridgeConfig};
use daily_log_sink::instrument::CallSite;
use daily_log_sink::sink::RotationConfig;
use daily_log_sink::{Level, LogConfig, Logger};

#[tokio::main]
async fn main() {
    let base_dir = std::env::temp_dir().join("daily-log-sink-load");
    let config = LogConfig::new(&base_dir, "custom_load")
        .with_console(false)
        .with_rotation(RotationConfig::default().with_max_bytes(1024 * 1024).with_backup_count(3));
    let logger = Logger::new("load.custom", config);

    let bridge = BridgeConfig {
        min_level: Level::Error,
        enable_stdout: false,
    };
    if let Err(e) = init_tracing_with_config(logger.clone(), bridge) {
        eprintln!("{e}");
        return;
    }

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let site = CallSite::new(&logger, "custom_load::tick");
    let _ = site
        .performance_async(50.0, |_| async {
            sleep(Duration::from_millis(100)).await;
            Ok::<_, String>(())
        })
        .await;
}
