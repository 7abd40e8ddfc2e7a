//! `mallgate` drives calls through a per-mall paced gateway.
//!
//! Every call is addressed to a mall and given as `MALL:PAYLOAD`. Calls for
//! one mall share a bounded queue and a pacing schedule; calls for different
//! malls never wait on each other. Congestion rejections (429) are retried
//! after the wait the API asks for.
//!
//! Route a few calls:
//! ```sh
//! mallgate mall-a:hello mall-a:ping mall-b:ping
//! ```
//!
//! Read calls from a file, one per line:
//! ```sh
//! mallgate --input calls.txt
//! ```
//!
//! Squeeze the simulated API and watch the retries:
//! ```sh
//! mallgate -vv --bucket-capacity 2 --max-requests-per-second 20 --input calls.txt
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use formatters::log::init_logging;
use log::{error, info};
use mallgate_lib::Gateway;

mod drive;
mod formatters;
mod input;
mod options;
mod parse;
mod verbosity;

use crate::drive::drive;
use crate::formatters::report::Report;
use crate::options::{Config, MALLGATE_CONFIG_FILE, MallgateOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    CallFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<MallgateOptions> {
    let mut opts = MallgateOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // A default config file in the current directory is optional, but
        // must be valid if it exists.
        let default_config = PathBuf::from(MALLGATE_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    opts.config
        .gateway_config()
        .validate()
        .context("Invalid gateway settings")?;

    Ok(opts)
}

/// Set up runtime and call mallgate entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e:#}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(&opts))
}

/// Route all calls and print the report
async fn run(opts: &MallgateOptions) -> Result<i32> {
    let calls = opts.calls()?;
    let gateway = Gateway::with_simulator(opts.config.gateway_config())?;
    info!("Routing {} calls", calls.len());

    let calls = drive(&gateway, calls, opts.config.timeout).await;
    let report = Report {
        calls,
        metrics: gateway.all_metrics(),
    };

    let formatter = formatters::get_report_formatter(&opts.config.format);
    let output = formatter.format(&report)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end()).context("Cannot write report")?;

    let exit_code = if report.is_success() {
        ExitCode::Success
    } else {
        ExitCode::CallFailure
    };
    Ok(exit_code as i32)
}
