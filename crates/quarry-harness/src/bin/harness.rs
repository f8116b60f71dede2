//! CLI entrypoint for the quarry allocator harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quarry_harness::scenario::{self, TraceConfig};
use quarry_harness::structured_log::LogEmitter;

/// Scenario tooling for the quarry allocators.
#[derive(Debug, Parser)]
#[command(name = "quarry-harness")]
#[command(about = "Deterministic trace runner and heap diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a seeded alloc/free/realloc trace with per-step audits.
    Trace {
        /// Seed for the deterministic trace.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Number of steps to run.
        #[arg(long, default_value_t = 2000)]
        steps: usize,
        /// Heap capacity in bytes (also the growth increment).
        #[arg(long, default_value_t = 65536)]
        capacity: usize,
        /// Grow the heap on exhaustion instead of recording the failure.
        #[arg(long)]
        grow: bool,
        /// Write the JSONL log here instead of stdout.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Replay the best-fit/coalescence walkthrough and dump every block.
    Dump {
        /// Heap capacity in bytes.
        #[arg(long, default_value_t = 1024)]
        capacity: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Trace {
            seed,
            steps,
            capacity,
            grow,
            log,
        } => {
            let run_id = format!("trace-{seed}");
            let mut emitter = match log {
                Some(path) => match LogEmitter::to_file(&path, &run_id) {
                    Ok(e) => e,
                    Err(err) => {
                        eprintln!("cannot open log file: {err}");
                        return ExitCode::FAILURE;
                    }
                },
                None => LogEmitter::to_stdout(&run_id),
            };
            let cfg = TraceConfig {
                seed,
                steps,
                capacity,
                grow,
            };
            let report = match scenario::run_trace(&cfg, &mut emitter) {
                Ok(r) => r,
                Err(err) => {
                    eprintln!("trace aborted: {err}");
                    return ExitCode::FAILURE;
                }
            };
            match serde_json::to_string_pretty(&report) {
                Ok(summary) => eprintln!("{summary}"),
                Err(err) => eprintln!("cannot render summary: {err}"),
            }
            if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Dump { capacity } => match scenario::showcase(capacity) {
            Ok(stages) => {
                for stage in &stages {
                    match serde_json::to_string(stage) {
                        Ok(line) => println!("{line}"),
                        Err(err) => {
                            eprintln!("cannot render stage: {err}");
                            return ExitCode::FAILURE;
                        }
                    }
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("showcase failed: {err}");
                ExitCode::FAILURE
            }
        },
    }
}
