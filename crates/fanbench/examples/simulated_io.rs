//! Benchmark definition with two simulated request groups
//!
//! Run locally:    cargo run --example simulated_io -- start --workers 4
//! As a slave:     cargo run --example simulated_io -- slave --port 8080
//! With slaves:    cargo run --example simulated_io -- start --slaves 10.0.0.5,10.0.0.6:9000

use std::sync::Arc;
use std::time::Duration;

use fanbench::{Benchmark, BenchmarkConfig, BenchmarkDefine};
use futures::future;
use tokio::time::sleep;

fn main() {
    let config = BenchmarkConfig {
        title: "simulated io".into(),
        description: "two request groups with distinct latencies".into(),
        measurement_interval_seconds: 5,
        duration_seconds: 30,
        concurrent_request_count: 8,
    };

    let define = BenchmarkDefine::new(config, |benchmark: Arc<Benchmark>| async move {
        // One request loop per assigned slot
        let units = (0..benchmark.request_num()).map(|_| {
            let benchmark = Arc::clone(&benchmark);
            async move {
                let mut count = 0u64;
                while benchmark.running() {
                    count += 1;

                    let trial = benchmark.test("read");
                    sleep(Duration::from_millis(12)).await;
                    trial.success();

                    let trial = benchmark.test("write");
                    sleep(Duration::from_millis(28)).await;
                    if count % 50 == 0 {
                        trial.error("simulated write conflict");
                    } else {
                        trial.success();
                    }
                }
            }
        });
        future::join_all(units).await;
        Ok(())
    });

    fanbench::cli::main(define);
}
