//! Command-line interface for insights.
//!
//! Provides commands for analyzing a CSV file with generated code, an
//! interactive session, chart housekeeping and configuration inspection.

use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config;
use crate::core::reply::{self, CodeExtraction, RequestError};
use crate::core::{Session, TaskOrchestrator};
use crate::domain::{DatasetRef, TaskRequest, TaskResult};

pub mod charts;

use charts::ChartsCommands;

/// insights - Ask questions of a CSV file with generated analysis code
#[derive(Parser, Debug)]
#[command(name = "insights")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run analysis code against a CSV file
    Analyze {
        /// CSV file to analyze
        data: PathBuf,

        /// Variable name the dataset is bound to
        #[arg(long = "var", default_value = "df")]
        variable: String,

        /// Code to run (reads from --file or stdin if not provided)
        #[arg(short, long)]
        code: Option<String>,

        /// File containing code to run
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Treat the input as a model reply and run its ```python block
        #[arg(long)]
        reply: bool,

        /// Reasoning recorded with the step
        #[arg(short, long, default_value = "")]
        thought: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session against a CSV file
    Repl {
        /// CSV file to analyze
        data: PathBuf,

        /// Variable name the dataset is bound to
        #[arg(long = "var", default_value = "df")]
        variable: String,
    },

    /// Manage exported charts
    Charts {
        #[command(subcommand)]
        command: ChartsCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze {
                data,
                variable,
                code,
                file,
                reply,
                thought,
                json,
            } => analyze(&data, &variable, code, file, reply, thought, json).await,
            Commands::Repl { data, variable } => repl(&data, &variable).await,
            Commands::Charts { command } => match command {
                ChartsCommands::List => charts::execute_list().await,
                ChartsCommands::Cleanup { ttl } => charts::execute_cleanup(ttl).await,
                ChartsCommands::Reset { yes } => charts::execute_reset(yes).await,
                ChartsCommands::Touch { filename } => charts::execute_touch(&filename).await,
            },
            Commands::Config => show_config().await,
        }
    }
}

/// Build the orchestrator from the global configuration
fn orchestrator() -> Result<TaskOrchestrator> {
    TaskOrchestrator::from_config(config::config()?)
}

/// Read the code for `analyze` from the flag, a file or stdin
fn read_source(code: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read code file: {}", path.display()));
    }
    if io::stdin().is_terminal() {
        anyhow::bail!("No code provided. Use --code, --file <path> or pipe to stdin");
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Run one analysis turn and print the result
async fn analyze(
    data: &Path,
    variable: &str,
    code: Option<String>,
    file: Option<PathBuf>,
    from_reply: bool,
    thought: String,
    json: bool,
) -> Result<()> {
    let source = read_source(code, file)?;
    let code = if from_reply {
        match reply::extract_code(&source) {
            CodeExtraction::Code(code) => code,
            CodeExtraction::Missing => {
                let err = RequestError::NoCode {
                    question: thought.clone(),
                    suggestions: None,
                };
                eprintln!("[{}] {}", err.status_code(), err);
                std::process::exit(2);
            }
        }
    } else {
        source
    };

    if code.trim().is_empty() {
        anyhow::bail!("Code is empty");
    }

    let orchestrator = orchestrator()?;
    let mut session = Session::new("cli");
    let request = TaskRequest::new(code)
        .with_thought(thought)
        .with_dataset(DatasetRef::new(variable, data));

    let result = match orchestrator.run(&mut session, &request).await {
        Ok(result) => result,
        Err(e) => {
            let err = RequestError::from(e);
            eprintln!("[{}] {}", err.status_code(), err);
            std::process::exit(2);
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        print_result(&orchestrator, &result);
    }

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_result(orchestrator: &TaskOrchestrator, result: &TaskResult) {
    if result.is_success() {
        print!("{}", result.output);
        if !result.output.is_empty() && !result.output.ends_with('\n') {
            println!();
        }
    } else {
        eprintln!("Error: {}", result.output);
    }

    if let Some(ref filenames) = result.chart_filenames {
        for path in orchestrator.publish(filenames) {
            eprintln!("[chart] {}", path);
        }
    }
}

/// Interactive loop; a blank line runs the pending block
async fn repl(data: &Path, variable: &str) -> Result<()> {
    let orchestrator = orchestrator()?;
    let mut session = Session::new("repl");
    let dataset = DatasetRef::new(variable, data);

    eprintln!(
        "insights repl - '{}' is bound to {}. Blank line runs, :vars lists, :reset clears, :quit exits.",
        variable,
        data.display()
    );

    let stdin = io::stdin();
    let mut pending = String::new();
    loop {
        eprint!("{}", if pending.is_empty() { ">>> " } else { "... " });
        io::stderr().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read input")? == 0 {
            break;
        }

        match line.trim() {
            ":quit" | ":q" => break,
            ":vars" => {
                for (name, value) in session.namespace.bindings() {
                    println!("{:<16} {}", name, value.type_name());
                }
                continue;
            }
            ":reset" => {
                session.reset();
                eprintln!("[namespace cleared]");
                continue;
            }
            "" if !pending.is_empty() => {}
            "" => continue,
            trimmed => {
                let opens_block = trimmed.ends_with(':');
                let starts_block = pending.is_empty();
                pending.push_str(&line);
                // single statements run immediately, blocks wait for a blank line
                if !(starts_block && !opens_block) {
                    continue;
                }
            }
        }

        let request = TaskRequest::new(std::mem::take(&mut pending)).with_dataset(dataset.clone());
        match orchestrator.run(&mut session, &request).await {
            Ok(result) => print_result(&orchestrator, &result),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Insights Configuration");
    println!("======================");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", config::paths::insights_home()?.display());
    println!("  Charts:              {}", config::paths::charts_dir()?.display());
    println!("  Metadata:            {}", config::paths::metadata_path()?.display());
    println!();
    println!("Charts:");
    println!("  TTL:              {}s", cfg.charts.policy.ttl_seconds);
    println!("  Static base:      {}", cfg.charts.policy.static_base);
    println!("  Metadata backend: {}", cfg.charts.metadata_backend.as_str());
    println!();
    println!("Execution:");
    println!("  Executor:         {:?}", cfg.execution.executor);
    println!("  Command:          {} {}", cfg.execution.command, cfg.execution.args.join(" "));
    println!("  Timeout:          {}s", cfg.execution.limits.timeout_seconds);
    println!("  Max steps:        {}", cfg.execution.limits.max_steps);
    println!("  Max code size:    {} bytes", cfg.execution.limits.max_code_bytes);
    println!("  Max output size:  {} bytes", cfg.execution.limits.max_output_bytes);

    Ok(())
}
