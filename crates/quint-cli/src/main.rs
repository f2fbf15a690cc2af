use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use quint_core::{resolve, DefLookup, Module, ScopeTree};
use quint_sim::compile::{compile, ConstBindings};
use quint_sim::simulator::{SimulationConfig, Simulator, TestResult};

/// Output format for simulation verdicts
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Human,
    /// Structured JSON for tooling
    Json,
}

#[derive(Parser)]
#[command(name = "quint", version, about = "Quint evaluation core CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a module IR (JSON) and check that every name resolves.
    Parse {
        /// Module IR file produced by the frontend.
        file: PathBuf,
    },
    /// Resolve, compile and simulate a module IR.
    Run {
        /// Module IR file produced by the frontend.
        file: PathBuf,
        /// Name of the initialization action.
        #[arg(long, default_value = "init")]
        init: String,
        /// Name of the step action.
        #[arg(long, default_value = "step")]
        step: String,
        /// Name of the invariant to check after every step.
        #[arg(long, default_value = "inv")]
        invariant: String,
        /// Number of runs to attempt.
        #[arg(long, default_value = "100")]
        max_samples: usize,
        /// Maximum number of steps per run.
        #[arg(long, default_value = "20")]
        max_steps: usize,
        /// Seed for the random generator; omit for an entropy seed.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Parse { file } => cmd_parse(&file),
        Command::Run {
            file,
            init,
            step,
            invariant,
            max_samples,
            max_steps,
            seed,
            format,
        } => {
            let config = SimulationConfig {
                runs: max_samples,
                steps: max_steps,
                seed,
                init,
                step,
                invariant,
            };
            cmd_run(&file, config, format)
        }
    }
}

fn load_module(file: &Path) -> Result<Module> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("cannot decode {}", file.display()))
}

/// Exit 0 iff name resolution succeeds.
fn cmd_parse(file: &Path) -> Result<ExitCode> {
    let module = load_module(file)?;
    let defs = DefLookup::from_module(&module);
    let tree = ScopeTree::from_module(&module);
    match resolve(&module, &defs, &tree) {
        Ok(()) => {
            println!("module {} resolved", module.name);
            Ok(ExitCode::SUCCESS)
        }
        Err(errors) => {
            for error in &errors {
                eprintln!("error: {error}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Exit 0 iff no invariant violation was found.
fn cmd_run(file: &Path, config: SimulationConfig, format: OutputFormat) -> Result<ExitCode> {
    let module = load_module(file)?;

    let defs = DefLookup::from_module(&module);
    let tree = ScopeTree::from_module(&module);
    if let Err(errors) = resolve(&module, &defs, &tree) {
        for error in &errors {
            eprintln!("error: {error}");
        }
        return Ok(ExitCode::FAILURE);
    }

    let compiled = compile(&module, &ConstBindings::default());
    let result = Simulator::new(&compiled, config).run();

    match format {
        OutputFormat::Human => print_human(&result),
        OutputFormat::Json => print_json(&result)?,
    }

    Ok(if result.is_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_human(result: &TestResult) {
    match result {
        TestResult::Passed(stats) => {
            println!(
                "ok: {} runs, {} steps, no violation found (seed {})",
                stats.runs_executed, stats.steps_executed, stats.seed
            );
        }
        TestResult::Violation {
            invariant,
            trace,
            stats,
        } => {
            println!("violation: invariant {invariant} is false (seed {})", stats.seed);
            print!("{trace}");
        }
        TestResult::Failed { errors, stats } => {
            println!("failed (seed {}):", stats.seed);
            for error in errors {
                println!("  {error}");
            }
        }
    }
}

fn print_json(result: &TestResult) -> Result<()> {
    let json = match result {
        TestResult::Passed(stats) => serde_json::json!({
            "result": "passed",
            "stats": stats,
        }),
        TestResult::Violation {
            invariant,
            trace,
            stats,
        } => serde_json::json!({
            "result": "violation",
            "invariant": invariant,
            "trace": trace,
            "stats": stats,
        }),
        TestResult::Failed { errors, stats } => serde_json::json!({
            "result": "failed",
            "errors": errors,
            "stats": stats,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
