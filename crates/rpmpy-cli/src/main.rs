mod app;
mod config;
mod render;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rpmpy_core::{current_output_style, render_log_line, Level, Logger};

use crate::app::Application;
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "rpm-py-installer")]
#[command(
    about = "Install the RPM Python binding into a Python environment",
    long_about = "Install the RPM Python binding into a Python environment.\n\n\
                  Settings are read from RPM_PY_* environment variables."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Build and install the binding (default).
    Install,
    /// Print the detected host and source locations without changing anything.
    Doctor,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!(
                "{}",
                render_log_line(current_output_style(), Level::Error, &format!("{err:#}"))
            );
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    let logger = Logger::new(config.verbose, current_output_style());
    let app = Application::new(config, logger);

    match cli.command.unwrap_or(Commands::Install) {
        Commands::Install => {
            app.run()?;
        }
        Commands::Doctor => {
            for line in app.doctor()? {
                println!("{line}");
            }
        }
    }
    Ok(())
}
