use std::env;
use std::io::{self, Write};
use std::process::Command;
use std::time::Instant;

/// Labels printed by the perf bench in single-iteration mode.
const TIMINGS: [(&str, &str); 4] = [
    ("linelog console: ", "linelog console logging time (ms)"),
    ("linelog json: ", "linelog JSON logging time (ms)"),
    ("log4rs: ", "log4rs logging time (ms)"),
    ("tracing: ", "tracing logging time (ms)"),
];

fn main() -> io::Result<()> {
    let num_runs = env::args()
        .nth(1)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10);

    println!("Running benchmark {} times...", num_runs);

    let mut times: Vec<Vec<f64>> = vec![Vec::with_capacity(num_runs); TIMINGS.len()];
    let mut speedups = Vec::with_capacity(num_runs);
    let mut linelog_sizes = Vec::with_capacity(num_runs);
    let mut log4rs_sizes = Vec::with_capacity(num_runs);
    let mut completed = 0;

    let start_time = Instant::now();

    for i in 1..=num_runs {
        print!("Run {}/{}... ", i, num_runs);
        io::stdout().flush()?;

        let output = Command::new("cargo")
            .args(["bench", "--bench", "perf_tests"])
            .env("SINGLE_ITERATION", "1")
            .output()?;

        if !output.status.success() {
            eprintln!("Benchmark failed on run {}", i);
            continue;
        }
        completed += 1;

        let output_str = String::from_utf8_lossy(&output.stdout);

        for ((prefix, _), samples) in TIMINGS.iter().zip(times.iter_mut()) {
            if let Some(ms) = parse_value(&output_str, prefix, " ms") {
                samples.push(ms);
            }
        }

        let linelog = parse_value(&output_str, "linelog console: ", " ms");
        let log4rs = parse_value(&output_str, "log4rs: ", " ms");
        match (linelog, log4rs) {
            (Some(linelog), Some(log4rs)) if linelog > 0.0 => {
                let speedup = log4rs / linelog;
                speedups.push(speedup);
                println!("Speedup: {:.2}x", speedup);
            }
            _ => println!("no timings found"),
        }

        if let Some(size) = parse_value(&output_str, "linelog log size: ", " MB") {
            linelog_sizes.push(size);
        }
        if let Some(size) = parse_value(&output_str, "log4rs log size: ", " MB") {
            log4rs_sizes.push(size);
        }
    }

    let elapsed = start_time.elapsed();
    println!("\nCompleted {} runs in {:.2?}", completed, elapsed);

    println!("\n===== PERFORMANCE SUMMARY =====");

    for ((_, title), samples) in TIMINGS.iter().zip(&times) {
        report(title, samples);
    }
    report("Speedup (log4rs/linelog)", &speedups);
    report("linelog Log Size (MB)", &linelog_sizes);
    report("log4rs Log Size (MB)", &log4rs_sizes);

    Ok(())
}

fn report(title: &str, values: &[f64]) {
    if let Some(stats) = calculate_stats(values) {
        println!("\n{}:", title);
        print_stats(&stats);
    }
}

fn parse_value(text: &str, prefix: &str, suffix: &str) -> Option<f64> {
    text.lines()
        .find(|line| line.starts_with(prefix))
        .and_then(|line| {
            let start = prefix.len();
            let end = line[start..].find(suffix)?;
            line[start..start + end].trim().parse::<f64>().ok()
        })
}

struct Stats {
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
    std_dev: f64,
    std_dev_percent: f64,
}

fn calculate_stats(values: &[f64]) -> Option<Stats> {
    if values.is_empty() {
        return None;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let variance = values.iter().map(|v| (mean - v).powi(2)).sum::<f64>() / count;
    let std_dev = variance.sqrt();
    let std_dev_percent = if mean != 0.0 { std_dev / mean * 100.0 } else { 0.0 };

    Some(Stats {
        min,
        max,
        mean,
        median,
        std_dev,
        std_dev_percent,
    })
}

fn print_stats(stats: &Stats) {
    println!("  Min: {:.3}", stats.min);
    println!("  Max: {:.3}", stats.max);
    println!("  Mean: {:.3}", stats.mean);
    println!("  Median: {:.3}", stats.median);
    println!("  Std Dev: {:.3} ({:.2}% of mean)", stats.std_dev, stats.std_dev_percent);
}
