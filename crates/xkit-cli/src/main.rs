//! xkit — thin CLI front end over the kernel's `dispatch` entry point.
//!
//! Unlike a daemon-backed CLI, this binary constructs a [`Kernel`] directly
//! in-process: there is no separate long-running server to connect to.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

use xkit_core::config::{LoggingConfig, RuntimeConfig};
use xkit_core::dirs::XkitHome;
use xkit_core::ids::CommandName;
use xkit_core::logging::{setup_logging, LogConfig, LogFormat};
use xkit_core::outcome::{DispatchResult, HandlerOutcome};
use xkit_kernel::kernel::Kernel;
use xkit_plugins::plugin::FactoryRegistry;

/// xkit — hybrid extensibility runtime command-line front end.
#[derive(Parser)]
#[command(name = "xkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit the dispatch result as JSON instead of a human-readable line.
    #[arg(long, global = true)]
    json: bool,

    /// Path to the runtime configuration file (defaults to `~/.xkit/xkit.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// The command name followed by its raw, unparsed arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    invocation: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = XkitHome::resolve().context("resolving xkit home directory")?;

    let config_path = cli.config.clone().unwrap_or_else(|| home.config_path());
    let config = RuntimeConfig::load_or_default(&config_path).context("loading runtime configuration")?;
    install_logging(&config.logging, cli.verbose);

    let Some((command, args)) = cli.invocation.split_first() else {
        eprintln!("usage: xkit <command> [args...]");
        std::process::exit(2);
    };

    let command_name = match CommandName::new(command.as_str()) {
        Ok(name) => name,
        Err(err) => {
            eprintln!("'{command}' is not a valid command name: {err}");
            std::process::exit(3);
        },
    };

    let kernel = Kernel::bootstrap(config, FactoryRegistry::new())
        .await
        .context("starting kernel")?;

    let payload = Value::Array(args.iter().cloned().map(Value::String).collect());
    let result = kernel.dispatch(command_name, payload).await;
    render(&result, cli.json);

    let code = result.exit_code();
    kernel.shutdown().await;
    std::process::exit(code);
}

fn install_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug".to_string() } else { logging.level.clone() };
    let format = if verbose { LogFormat::Pretty } else { LogFormat::Compact };
    let _ = setup_logging(&LogConfig::new(level).with_format(format));
}

fn render(result: &DispatchResult, as_json: bool) {
    if as_json {
        if let Ok(text) = serde_json::to_string(result) {
            println!("{text}");
        }
        return;
    }

    match result {
        DispatchResult::Handled(outcome) => render_outcome(outcome),
        DispatchResult::UnknownCommand { requested, suggestions } => {
            eprintln!("unknown command '{requested}'");
            if !suggestions.is_empty() {
                let names: Vec<&str> = suggestions.iter().map(xkit_core::ids::CommandName::as_str).collect();
                eprintln!("did you mean: {}?", names.join(", "));
            }
        },
    }
}

fn render_outcome(outcome: &HandlerOutcome) {
    match outcome {
        HandlerOutcome::Ok(value) => println!("{value}"),
        HandlerOutcome::UserError(message) => eprintln!("error: {message}"),
        HandlerOutcome::SystemError { message, cause } => {
            eprintln!("internal error: {message}");
            if let Some(cause) = cause {
                eprintln!("cause: {cause}");
            }
        },
    }
}
