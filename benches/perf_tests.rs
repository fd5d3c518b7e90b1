use criterion::{black_box, criterion_group, Criterion};
use linelog::{fields, Config, Logger, Mode, Output};
use log::LevelFilter;
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config as Log4rsConfig, Root},
    encode::pattern::PatternEncoder,
};
use std::fs;
use std::path::Path;
use std::sync::Once;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const ITERATIONS: usize = 200_000;
const DESCRIPTION: &str = "This is a longer description that includes some special characters !@#$%^&*() \
    and provides more context about the event. CPU: 95%, Memory: 2.5GB, Network: 1.2Gbps";

static LOG4RS_INIT: Once = Once::new();

fn setup_log4rs(log_file: &Path) {
    LOG4RS_INIT.call_once(|| {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{d} {l} {m}{n}")))
            .append(true)
            .build(log_file)
            .unwrap();

        let config = Log4rsConfig::builder()
            .appender(Appender::builder().build("logfile", Box::new(logfile)))
            .build(Root::builder().appender("logfile").build(LevelFilter::Info))
            .unwrap();

        log4rs::init_config(config).unwrap();
    });
}

fn linelog_config(mode: Mode) -> Config {
    Config::default().with_mode(mode).with_utc(true)
}

fn log_linelog(logger: &Logger, i: usize) {
    logger.info(
        "Test perf",
        &fields![
            "iteration", i,
            "id", 42,
            "active", true,
            "large_number", u64::MAX,
            "desc", DESCRIPTION,
        ],
    );
}

fn log_log4rs(i: usize) {
    log::info!(
        "Test perf iteration={} id={} active={} large_number={} desc={:?}",
        i,
        42,
        true,
        u64::MAX,
        DESCRIPTION
    );
}

fn log_tracing(i: usize) {
    tracing::info!(
        iteration = i,
        id = 42,
        active = true,
        large_number = u64::MAX,
        desc = DESCRIPTION,
        "Test perf"
    );
}

fn timed(mut f: impl FnMut(usize)) -> Duration {
    let start = Instant::now();
    for i in 0..ITERATIONS {
        f(i);
    }
    start.elapsed()
}

fn megabytes(path: &Path) -> f64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0) as f64 / (1024.0 * 1024.0)
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// One pass of every logger writing to files, printed in the format
/// `bench_stats` parses.
fn single_run() {
    let dir = tempdir().unwrap();
    let console_path = dir.path().join("linelog.log");
    let json_path = dir.path().join("linelog.json");
    let log4rs_path = dir.path().join("log4rs.log");

    let console = Logger::new(
        &linelog_config(Mode::Console),
        Output::file(&console_path).unwrap(),
    );
    let console_time = timed(|i| log_linelog(&console, i));
    console.close(Duration::from_secs(1));

    let json = Logger::new(&linelog_config(Mode::Json), Output::file(&json_path).unwrap());
    let json_time = timed(|i| log_linelog(&json, i));
    json.close(Duration::from_secs(1));

    setup_log4rs(&log4rs_path);
    let log4rs_time = timed(log_log4rs);
    log::logger().flush();

    let appender = tracing_appender::rolling::never(dir.path(), "tracing.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    let tracing_time = tracing::subscriber::with_default(subscriber, || timed(log_tracing));
    drop(guard);

    println!("\nPerformance comparison ({} iterations):", ITERATIONS);
    println!("linelog console: {:.3} ms", millis(console_time));
    println!("linelog json: {:.3} ms", millis(json_time));
    println!("log4rs: {:.3} ms", millis(log4rs_time));
    println!("tracing: {:.3} ms", millis(tracing_time));
    println!("linelog log size: {:.3} MB", megabytes(&console_path));
    println!("log4rs log size: {:.3} MB", megabytes(&log4rs_path));
    println!(
        "linelog throughput: {:.2} million msgs/sec",
        ITERATIONS as f64 / console_time.as_secs_f64() / 1_000_000.0
    );
}

fn bench_logging_comparison(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut group = c.benchmark_group("Logging Comparison");

    for (name, mode) in [("linelog_console", Mode::Console), ("linelog_json", Mode::Json)] {
        let logger = Logger::new(&linelog_config(mode), Output::writer(std::io::sink()));
        let mut i = 0usize;
        group.bench_function(name, |b| {
            b.iter(|| {
                i += 1;
                log_linelog(black_box(&logger), i)
            })
        });
        logger.close(Duration::from_secs(1));
    }

    setup_log4rs(&dir.path().join("log4rs.log"));
    let mut i = 0usize;
    group.bench_function("log4rs_file", |b| {
        b.iter(|| {
            i += 1;
            log_log4rs(black_box(i))
        })
    });

    let appender = tracing_appender::rolling::never(dir.path(), "tracing.log");
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let mut i = 0usize;
        group.bench_function("tracing_non_blocking", |b| {
            b.iter(|| {
                i += 1;
                log_tracing(black_box(i))
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_logging_comparison);

fn main() {
    if std::env::var_os("SINGLE_ITERATION").is_some() {
        single_run();
        return;
    }
    benches();
    Criterion::default().configure_from_args().final_summary();
}
