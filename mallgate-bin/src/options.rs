use crate::input::CallInput;
use crate::parse::CallSpec;
use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use mallgate_lib::{
    DEFAULT_BUCKET_CAPACITY, DEFAULT_LEAK_INTERVAL, DEFAULT_LEAK_RATE_PER_SECOND,
    DEFAULT_MAX_REQUESTS_PER_SECOND, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_CAPACITY, GatewayConfig,
    MallConfigs,
};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::{fs, str::FromStr, time::Duration};
use strum::{Display, EnumIter, VariantNames};

pub(crate) const MALLGATE_CONFIG_FILE: &str = "mallgate.toml";

/// How long a caller waits for one outcome
const DEFAULT_TIMEOUT: &str = "15s";
const DEFAULT_LEAK_INTERVAL_STR: &str = "1s";

// this exists because clap requires `&str` type values for defaults
// whereas serde expects owned values
const BUCKET_CAPACITY_STR: &str = concatcp!(DEFAULT_BUCKET_CAPACITY.get());
const LEAK_RATE_STR: &str = concatcp!(DEFAULT_LEAK_RATE_PER_SECOND.get());
const MAX_RPS_STR: &str = concatcp!(DEFAULT_MAX_REQUESTS_PER_SECOND.get());
const QUEUE_CAPACITY_STR: &str = concatcp!(DEFAULT_QUEUE_CAPACITY);
const MAX_RETRIES_STR: &str = concatcp!(DEFAULT_MAX_RETRIES);
// Shown as the default of `--config`, while still telling whether the user
// passed a path. A missing default file is not an error.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    MALLGATE_CONFIG_FILE,
);

/// The format of the printed report
#[derive(Debug, Deserialize, Default, Clone, Display, EnumIter, VariantNames, PartialEq, Eq)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum OutputFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "compact" | "string" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    bucket_capacity: NonZeroU32 = DEFAULT_BUCKET_CAPACITY;
    leak_rate: NonZeroU32 = DEFAULT_LEAK_RATE_PER_SECOND;
    leak_interval: Duration = DEFAULT_LEAK_INTERVAL;
    max_requests_per_second: NonZeroU32 = DEFAULT_MAX_REQUESTS_PER_SECOND;
    queue_capacity: usize = DEFAULT_QUEUE_CAPACITY;
    max_retries: u32 = DEFAULT_MAX_RETRIES;
    timeout: Duration = humantime::parse_duration(DEFAULT_TIMEOUT).unwrap();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// mallgate routes calls through a per-mall paced gateway to a simulated
/// rate-limited API and reports every outcome together with per-mall metrics.
///
/// Each mall gets its own bounded queue, pacing and retry loop, so a
/// congested mall never slows down another one.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct MallgateOptions {
    /// Calls to route, each given as `MALL:PAYLOAD`
    #[arg(
        name = "calls",
        value_name = "CALL",
        required_unless_present = "input",
        long_help = "Calls to route, each given as `MALL:PAYLOAD`.

Only the first `:` separates the mall from the payload. Calls are admitted
in the order given, command-line calls before calls from `--input`."
    )]
    raw_calls: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

impl MallgateOptions {
    /// All calls to route, in admission order
    pub(crate) fn calls(&self) -> Result<Vec<CallSpec>> {
        let mut calls = self
            .raw_calls
            .iter()
            .map(|call| call.parse())
            .collect::<Result<Vec<CallSpec>>>()
            .context("Cannot parse calls from arguments")?;

        if let Some(path) = &self.config.input {
            let input = CallInput::try_from(path.as_path()).context("Cannot read calls from --input")?;
            calls.extend(input.calls);
        }
        Ok(calls)
    }
}

/// The main configuration for mallgate
#[derive(Parser, Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Read calls from the given file or stdin (if path is '-')
    #[arg(
        short,
        long,
        value_name = "PATH",
        long_help = "Read calls from the given file or stdin (if path is '-').

File Format:
- Each line contains one call as `MALL:PAYLOAD`.
- Lines starting with '#' are treated as comments and ignored.
- Empty lines are also ignored."
    )]
    #[serde(default)]
    pub(crate) input: Option<PathBuf>,

    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Calls a mall's bucket holds before the API rejects with 429
    #[arg(long, env = "MALLGATE_BUCKET_CAPACITY", default_value = &BUCKET_CAPACITY_STR)]
    #[serde(default = "bucket_capacity")]
    pub(crate) bucket_capacity: NonZeroU32,

    /// Amount every bucket drains per leak tick
    #[arg(long, env = "MALLGATE_LEAK_RATE", default_value = &LEAK_RATE_STR)]
    #[serde(default = "leak_rate")]
    pub(crate) leak_rate: NonZeroU32,

    /// Period of the leak tick
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = &DEFAULT_LEAK_INTERVAL_STR
    )]
    #[serde(default = "leak_interval")]
    #[serde(with = "humantime_serde")]
    pub(crate) leak_interval: Duration,

    /// Maximum calls per second a single mall's worker issues
    #[arg(long, env = "MALLGATE_PER_MALL_MAX_RPS", default_value = &MAX_RPS_STR)]
    #[serde(default = "max_requests_per_second")]
    pub(crate) max_requests_per_second: NonZeroU32,

    /// Requests a mall's queue holds; further requests are dropped
    #[arg(long, env = "MALLGATE_QUEUE_CAPACITY", default_value = &QUEUE_CAPACITY_STR)]
    #[serde(default = "queue_capacity")]
    pub(crate) queue_capacity: usize,

    /// Retries after a 429 before the rejection is final
    #[arg(long, env = "MALLGATE_MAX_RETRIES", default_value = &MAX_RETRIES_STR)]
    #[serde(default = "max_retries")]
    pub(crate) max_retries: u32,

    /// How long to wait for each call's outcome, e.g. `15s` or `500ms`
    #[arg(
        short,
        long,
        value_parser = humantime::parse_duration,
        default_value = &DEFAULT_TIMEOUT
    )]
    #[serde(default = "timeout")]
    #[serde(with = "humantime_serde")]
    pub(crate) timeout: Duration,

    /// Output format of the report
    #[arg(short, long, default_value = "compact", value_parser = PossibleValuesParser::new(OutputFormat::VARIANTS).map(|s| s.parse::<OutputFormat>().unwrap()))]
    #[serde(default)]
    pub(crate) format: OutputFormat,

    /// Per-mall overrides, only available in the configuration file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) malls: MallConfigs,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: None,
            verbose: verbosity(),
            bucket_capacity: bucket_capacity(),
            leak_rate: leak_rate(),
            leak_interval: leak_interval(),
            max_requests_per_second: max_requests_per_second(),
            queue_capacity: queue_capacity(),
            max_retries: max_retries(),
            timeout: timeout(),
            format: OutputFormat::default(),
            malls: MallConfigs::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        // Read configuration file
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // Per-mall tables have no command-line syntax
        self.malls = toml.malls;

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..malls,

                // Keys with defaults to assign
                input: None,
                verbose: Verbosity::default(),
                bucket_capacity: DEFAULT_BUCKET_CAPACITY,
                leak_rate: DEFAULT_LEAK_RATE_PER_SECOND,
                leak_interval: DEFAULT_LEAK_INTERVAL,
                max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                max_retries: DEFAULT_MAX_RETRIES,
                timeout: timeout(),
                format: OutputFormat::default(),
            }
        }
    }

    /// The gateway settings described by this configuration
    pub(crate) fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            bucket_capacity: self.bucket_capacity,
            leak_rate_per_second: self.leak_rate,
            leak_interval: self.leak_interval,
            max_requests_per_second: self.max_requests_per_second,
            queue_capacity: self.queue_capacity,
            max_retries: self.max_retries,
            malls: self.malls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallgate_lib::MallKey;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> MallgateOptions {
        MallgateOptions::parse_from(std::iter::once("mallgate").chain(args.iter().copied()))
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        MallgateOptions::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let opts = parse(&["mall-a:hello"]);
        let expected = Config::default();

        assert_eq!(opts.config.bucket_capacity, expected.bucket_capacity);
        assert_eq!(opts.config.leak_rate, expected.leak_rate);
        assert_eq!(opts.config.leak_interval, expected.leak_interval);
        assert_eq!(opts.config.max_requests_per_second, expected.max_requests_per_second);
        assert_eq!(opts.config.queue_capacity, expected.queue_capacity);
        assert_eq!(opts.config.max_retries, expected.max_retries);
        assert_eq!(opts.config.timeout, Duration::from_secs(15));
        assert_eq!(opts.config.format, OutputFormat::Compact);
        assert_eq!(opts.config.gateway_config(), GatewayConfig::default());
    }

    #[test]
    fn test_calls_in_argument_order() {
        let opts = parse(&["mall-a:1", "mall-b:2", "mall-a:k=v:w"]);
        let calls = opts.calls().unwrap();
        let calls: Vec<_> = calls
            .iter()
            .map(|call| format!("{}/{}", call.key, call.payload))
            .collect();
        assert_eq!(calls, vec!["mall-a/1", "mall-b/2", "mall-a/k=v:w"]);
    }

    #[test]
    fn test_invalid_call_argument() {
        let opts = parse(&["mall-a"]);
        let error = opts.calls().unwrap_err();
        assert_eq!(error.to_string(), "Cannot parse calls from arguments");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse(&["--format", "json", "a:b"]).config.format, OutputFormat::Json);
        assert_eq!("STRING".parse::<OutputFormat>().unwrap(), OutputFormat::Compact);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_merge_prefers_cli_values() {
        let toml: Config = toml::from_str(
            r#"
            bucket_capacity = 4
            max_retries = 1
            timeout = "2s"
            format = "json"

            [malls.mall-fast]
            max_requests_per_second = 20
            "#,
        )
        .unwrap();

        let mut cli = parse(&["--max-retries", "5", "a:b"]).config;
        cli.merge(toml);

        // Taken from the file because the command line kept the default
        assert_eq!(cli.bucket_capacity.get(), 4);
        assert_eq!(cli.timeout, Duration::from_secs(2));
        assert_eq!(cli.format, OutputFormat::Json);
        // Given on the command line
        assert_eq!(cli.max_retries, 5);
        // Untouched by both
        assert_eq!(cli.queue_capacity, DEFAULT_QUEUE_CAPACITY);

        let gateway = cli.gateway_config();
        let fast = gateway.mall(&MallKey::from("mall-fast"));
        assert_eq!(fast.max_requests_per_second, NonZeroU32::new(20));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("bucket_size = 3").is_err());
        assert!(toml::from_str::<Config>("[malls.a]\nburst = 3").is_err());
    }
}
