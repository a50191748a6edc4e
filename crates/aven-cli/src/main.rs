use anyhow::Result;
use aven_cli::{check_file, CheckReport};
use aven_common::DiagnosticCategory;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "aven", version, about = "The Aven compiler front-end")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Type-check a source file and report diagnostics.
    Check {
        /// Path to the `.aven` source file.
        file: PathBuf,
        /// Emit diagnostics as JSON.
        #[arg(long)]
        json: bool,
        /// Print the finalized type of every top-level declaration.
        #[arg(long)]
        dump_types: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Check {
            file,
            json,
            dump_types,
        } => {
            let report = check_file(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.diagnostics)?);
            } else {
                print_human(&report);
            }
            if dump_types {
                for (name, ty) in &report.top_level_types {
                    println!("{name}: {ty}");
                }
            }
            Ok(if report.has_errors() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn print_human(report: &CheckReport) {
    for diag in &report.diagnostics {
        let (line, col) = if diag.span.is_dummy() {
            (0, 0)
        } else {
            report.line_map.line_col(diag.span.start)
        };
        let label = match diag.category {
            DiagnosticCategory::Error => "error".red().bold(),
            DiagnosticCategory::Warning => "warning".yellow().bold(),
        };
        println!(
            "{}:{line}:{col}: {label}[{:04}]: {}",
            diag.file, diag.code, diag.message
        );
        for related in &diag.related {
            let (rline, rcol) = report.line_map.line_col(related.span.start);
            println!("  {}:{rline}:{rcol}: note: {}", related.file, related.message);
        }
    }
    let errors = report
        .diagnostics
        .iter()
        .filter(|d| d.category == DiagnosticCategory::Error)
        .count();
    if errors > 0 {
        println!(
            "{}: {errors} error{} in module '{}'",
            "check failed".red().bold(),
            if errors == 1 { "" } else { "s" },
            report.module_name
        );
    }
}
