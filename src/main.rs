// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! crema CLI - evaluates an ES module and prints its default export

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Context as _;
use clap::Parser;
use crema_host::{CremaConfig, FsModuleLoader, HostError, JsValue, Runtime};
use owo_colors::OwoColorize;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "crema",
    about = "Evaluate an ES module and print its default export",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Module file to evaluate; reads standard input when omitted
    file: Option<PathBuf>,

    /// Evaluate module source from the command line
    #[arg(short = 'e', long = "eval", conflicts_with = "file")]
    eval: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

// Not async: the host owns its own executor and blocks on it.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "crema=debug,crema_host=debug"
    } else {
        "crema=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {:#}", "Error".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            CremaConfig::load(path).with_context(|| format!("failed to load config '{}'", path.display()))?
        }
        None => CremaConfig::default(),
    };

    let source = match (&cli.eval, &cli.file) {
        (Some(code), _) => code.clone(),
        (None, Some(path)) => {
            // Imports resolve next to the file unless configured otherwise.
            if cli.config.is_none() {
                config.loader.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            }
            std::fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))?
        }
        (None, None) => {
            let mut code = String::new();
            std::io::stdin().read_to_string(&mut code)?;
            code
        }
    };
    debug!(base_dir = %config.loader.base_dir.display(), "loader configured");

    let runtime = Runtime::new(config.runtime)?;
    let context = runtime.create_context()?;
    let loader = FsModuleLoader::new(config.loader);

    match context.evaluate_module(&source, Some(Rc::new(loader))) {
        Ok(value) => print_value(&value),
        Err(HostError::Script { message }) => {
            // Leave the context without a pending exception before it is torn down.
            context.get_and_clear_exception()?;
            anyhow::bail!("uncaught {message}")
        }
        Err(err) => Err(err.into()),
    }
}

fn print_value(value: &JsValue) -> anyhow::Result<()> {
    if value.value_type()? == crema_host::JsValueType::Undefined {
        return Ok(());
    }
    println!("{}", value.to_js_string()?);
    Ok(())
}
