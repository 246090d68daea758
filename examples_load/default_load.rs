use std::time::Instant;

use daily_log_sink::record::Fields;
use daily_log_sink::search::LogSearcher;
use daily_log_sink::{LogConfig, Logger};

fn main() {
    let base_dir = std::env::temp_dir().join("daily-log-sink-load");
    let config = LogConfig::new(&base_dir, "default_load").with_console(false);
    let logger = Logger::new("load.default", config.clone());

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger.info(
            "default load test record",
            Fields::new().action("LOAD").extra("iteration", i),
        );
    }

    let elapsed = start.elapsed();
    println!("default config: wrote {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let counts = LogSearcher::from_config(&config).count_logs("default_load", None, 1);
    println!("archive under {}: {:?}", base_dir.display(), counts);
}
