//! Litebridge Batch Benchmark
//!
//! Applies many insert batches through the database worker and reports
//! throughput for both decoders.
//! Run with: `cargo run --release --bin batch_bench -- [OPTIONS]`
//!
//! # Examples
//!
//! ```bash
//! # Default: 200 batches of 500 rows from 4 concurrent tasks, both decoders
//! cargo run --release --bin batch_bench
//!
//! # Streamed decoder only, bigger batches
//! cargo run --release --bin batch_bench -- --mode streamed --rows 5000
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use litebridge::{spawn_worker, Database, WorkerHandle};
use serde_json::json;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Structured,
    Streamed,
    Both,
}

/// Benchmark configuration
struct Config {
    /// Number of batches per decoder
    num_batches: usize,
    /// Rows inserted by each batch
    rows_per_batch: usize,
    /// Concurrent submitting tasks
    concurrency: usize,
    /// Which decoder(s) to measure
    mode: Mode,
    /// Path to database file (or temp if None)
    db_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_batches: 200,
            rows_per_batch: 500,
            concurrency: 4,
            mode: Mode::Both,
            db_path: None,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--batches" | "-b" => {
                i += 1;
                config.num_batches = args[i].parse().expect("Invalid --batches value");
            }
            "--rows" | "-r" => {
                i += 1;
                config.rows_per_batch = args[i].parse().expect("Invalid --rows value");
            }
            "--concurrency" | "-c" => {
                i += 1;
                config.concurrency = args[i].parse().expect("Invalid --concurrency value");
            }
            "--mode" | "-m" => {
                i += 1;
                config.mode = match args[i].as_str() {
                    "structured" => Mode::Structured,
                    "streamed" => Mode::Streamed,
                    "both" => Mode::Both,
                    other => {
                        eprintln!("Unknown mode: {}", other);
                        std::process::exit(1);
                    }
                };
            }
            "--db" | "-d" => {
                i += 1;
                config.db_path = Some(args[i].clone());
            }
            "--help" | "-h" => {
                println!(
                    r#"Litebridge Batch Benchmark

Usage: batch_bench [OPTIONS]

Options:
  -b, --batches <N>     Batches per decoder (default: 200)
  -r, --rows <N>        Rows per batch (default: 500)
  -c, --concurrency <N> Concurrent submitting tasks (default: 4)
  -m, --mode <MODE>     structured | streamed | both (default: both)
  -d, --db <PATH>       Database path (default: temp file)
  -h, --help            Show this help
"#
                );
                std::process::exit(0);
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

/// One batch: a single INSERT operation with `rows` ArgBatches.
fn make_batch(prefix: &str, batch: usize, rows: usize) -> serde_json::Value {
    let args: Vec<serde_json::Value> = (0..rows)
        .map(|row| json!([format!("{prefix}-{batch}-{row}"), "bench row", row]))
        .collect();

    json!([[0, "items", "INSERT INTO items (id, title, position) VALUES (?, ?, ?)", args]])
}

async fn run(
    worker: &WorkerHandle,
    config: &Config,
    streamed: bool,
) -> (Duration, u64, u64) {
    let prefix = if streamed { "streamed" } else { "structured" };
    let rows_written = Arc::new(AtomicU64::new(0));
    let errors = Arc::new(AtomicU64::new(0));
    let batches_per_task = config.num_batches / config.concurrency.max(1);

    let start = Instant::now();
    let mut handles = Vec::new();

    for task_id in 0..config.concurrency.max(1) {
        let worker = worker.clone();
        let rows_written = rows_written.clone();
        let errors = errors.clone();
        let rows = config.rows_per_batch;

        handles.push(tokio::spawn(async move {
            for i in 0..batches_per_task {
                let batch = make_batch(prefix, task_id * batches_per_task + i, rows);
                let result = if streamed {
                    worker.batch_json(batch.to_string()).await
                } else {
                    let operations = match batch {
                        serde_json::Value::Array(ops) => ops,
                        other => vec![other],
                    };
                    worker.batch(operations).await
                };

                match result {
                    Ok(stats) => {
                        rows_written.fetch_add(stats.executions as u64, Ordering::Relaxed);
                    }
                    Err(_) => {
                        errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    (
        start.elapsed(),
        rows_written.load(Ordering::Relaxed),
        errors.load(Ordering::Relaxed),
    )
}

fn report(label: &str, (elapsed, rows, errors): (Duration, u64, u64)) {
    println!("{label}");
    println!("  Rows written:  {}", rows);
    println!("  Errors:        {}", errors);
    println!("  Duration:      {:?}", elapsed);
    println!(
        "  Throughput:    {:.2} rows/sec",
        rows as f64 / elapsed.as_secs_f64()
    );
    println!();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = parse_args();

    println!("Litebridge Batch Benchmark");
    println!("==========================");
    println!("Batches:     {}", config.num_batches);
    println!("Rows/batch:  {}", config.rows_per_batch);
    println!("Concurrency: {}", config.concurrency);
    println!();

    let temp_dir = std::env::temp_dir().join(format!("litebridge-bench-{}", std::process::id()));
    std::fs::create_dir_all(&temp_dir).expect("create temp dir");
    let db_path = config
        .db_path
        .clone()
        .unwrap_or_else(|| temp_dir.join("bench.db").to_string_lossy().to_string());

    println!("Database:    {}", db_path);
    println!();

    let mut db = Database::open(&db_path).unwrap();
    db.execute_statements(
        "DROP TABLE IF EXISTS items;
         CREATE TABLE items (id TEXT PRIMARY KEY, title TEXT, position INTEGER);",
    )
    .unwrap();
    let worker = spawn_worker(db).unwrap();

    let mut expected = 0;
    if config.mode != Mode::Streamed {
        let result = run(&worker, &config, false).await;
        expected += result.1;
        report("Structured decoder", result);
    }
    if config.mode != Mode::Structured {
        let result = run(&worker, &config, true).await;
        expected += result.1;
        report("Streamed decoder", result);
    }

    let count = worker
        .count("SELECT COUNT(*) FROM items", vec![])
        .await
        .unwrap();
    assert_eq!(
        count as u64, expected,
        "Row count mismatch: {} in DB, {} reported",
        count, expected
    );
    println!("Row count verified: {} ✓", count);

    worker.close().await.unwrap();
}
