use crate::client::UrlOpener;
use crate::config::{parse_duration, Config};
use crate::error::{EXIT_SUCCESS, EXIT_USAGE};
use crate::executor::{ExecuteOptions, Executor, DEFAULT_TIMEOUT};
use crate::input::{read_token_from_file, read_token_from_stdin, InputError};
use crate::output::{OutputMode, OutputOptions, Outputter};
use crate::params::Params;
use std::io::Write;
use std::time::Duration;
use structopt::StructOpt;
use thiserror::Error;
use tracing::warn;

const TOKEN_PARAM: &str = "token";

#[derive(Debug, StructOpt)]
#[structopt(name = "bearx")]
/// Drive Bear through x-callback-url
///
/// Builds a bear://x-callback-url request, opens it, and optionally waits for Bear to call
/// back with the result (http://x-callback-url.com).
pub struct CallbackOpts {
    /// Suppress success output
    #[structopt(short, long)]
    pub quiet: bool,
    /// Verbose diagnostics on stderr
    #[structopt(short, long)]
    pub verbose: bool,
    /// Output JSON
    #[structopt(long)]
    pub json: bool,
    /// Output plain key=value lines
    #[structopt(long)]
    pub plain: bool,
    /// Print the URL without opening Bear
    #[structopt(long)]
    pub dry_run: bool,
    /// Print the generated Bear URL
    #[structopt(long)]
    pub print_url: bool,
    /// Wait for Bear's x-success / x-error callback
    #[structopt(long)]
    pub enable_callback: bool,
    /// Never ask Bear for a callback, even if one is configured
    #[structopt(long)]
    pub no_callback: bool,
    /// Send Bear's callbacks to this URL instead of waiting locally
    #[structopt(long)]
    pub callback: Option<String>,
    /// How long to wait for the callback, e.g. 5s or 500ms (0 disables waiting)
    #[structopt(long, parse(try_from_str = parse_duration))]
    pub timeout: Option<Duration>,
    /// Read the Bear API token from a file
    #[structopt(long)]
    pub token_file: Option<String>,
    /// Read the Bear API token from stdin
    #[structopt(long)]
    pub token_stdin: bool,
    /// Name of action
    ///
    /// Action for Bear to execute.
    ///
    /// Example: open-note
    pub action: String,
    /// Action parameters
    ///
    /// Space delimited key=value pairs. Repeat a key to send several values.
    ///
    /// Example: title="My Note Title" text="First line"
    pub parameters: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("--json and --plain are mutually exclusive")]
    JsonAndPlain,
    #[error("--no-callback cannot be combined with --enable-callback")]
    CallbackConflict,
    #[error("--enable-callback requires --timeout > 0 or --callback")]
    CallbackWithoutWait,
    #[error("--token-file and --token-stdin are mutually exclusive")]
    TokenSourceConflict,
    #[error("invalid parameter format: {0:?} (expected key=value)")]
    InvalidParameter(String),
}

/// Where the API token comes from, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    None,
    File(String),
    Stdin,
}

/// Flags and configuration merged into what the executor and presenter need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub execute: ExecuteOptions,
    pub output: OutputOptions,
    pub token: TokenSource,
}

impl Invocation {
    /// Flags win over configuration; configuration wins over built-in defaults.
    pub fn resolve(opts: &CallbackOpts, config: &Config) -> Result<Invocation, UsageError> {
        let callback_override = opts
            .callback
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| config.callback_url.clone());
        let timeout = opts.timeout.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT);

        if opts.json && opts.plain {
            return Err(UsageError::JsonAndPlain);
        }
        if opts.no_callback && opts.enable_callback {
            return Err(UsageError::CallbackConflict);
        }
        if opts.enable_callback && callback_override.is_none() && timeout.is_zero() {
            return Err(UsageError::CallbackWithoutWait);
        }
        if opts.token_file.is_some() && opts.token_stdin {
            return Err(UsageError::TokenSourceConflict);
        }

        let mode = if opts.json {
            OutputMode::Json
        } else if opts.plain {
            OutputMode::Plain
        } else {
            OutputMode::Human
        };
        let token = if opts.token_stdin {
            TokenSource::Stdin
        } else {
            match opts.token_file.clone().or_else(|| config.token_file.clone()) {
                Some(path) => TokenSource::File(path),
                None => TokenSource::None,
            }
        };

        Ok(Invocation {
            execute: ExecuteOptions {
                enable_callback: opts.enable_callback,
                no_callback: opts.no_callback,
                callback_override,
                timeout,
                dry_run: opts.dry_run,
            },
            output: OutputOptions {
                mode,
                quiet: opts.quiet,
                print_url: opts.print_url,
                dry_run: opts.dry_run,
            },
            token,
        })
    }
}

impl CallbackOpts {
    pub fn params(&self) -> Result<Params, UsageError> {
        self.parameters
            .iter()
            .map(|raw| parse_parameter(raw))
            .collect::<Result<Vec<_>, _>>()
            .map(|pairs| pairs.into_iter().collect())
    }
}

/// Runs one action and returns the process exit code.
pub async fn run<O, W, E>(
    opts: &CallbackOpts,
    config: &Config,
    opener: O,
    stdout: W,
    mut stderr: E,
) -> i32
where
    O: UrlOpener,
    W: Write,
    E: Write,
{
    let resolved = Invocation::resolve(opts, config)
        .and_then(|invocation| opts.params().map(|params| (invocation, params)));
    let (invocation, mut params) = match resolved {
        Ok(resolved) => resolved,
        Err(err) => {
            let _ = writeln!(stderr, "error: {}\n\nFor more information try --help", err);
            return EXIT_USAGE;
        }
    };

    match resolve_token(&invocation.token) {
        Ok(Some(token)) => params.set(TOKEN_PARAM, token),
        Ok(None) => {}
        Err(err) => {
            let _ = writeln!(stderr, "error: {}", err);
            return EXIT_USAGE;
        }
    }

    let executor = Executor::new(opener, invocation.execute);
    let mut out = Outputter::new(invocation.output, stdout, stderr);
    let (written, code) = match executor.execute(&opts.action, params).await {
        Ok(result) => (out.write_success(&result), EXIT_SUCCESS),
        Err(failure) => (out.write_failure(&failure), failure.error.exit_code()),
    };
    if let Err(err) = written {
        warn!(%err, "failed to write output");
    }
    code
}

fn resolve_token(source: &TokenSource) -> Result<Option<String>, InputError> {
    let token = match source {
        TokenSource::None => return Ok(None),
        TokenSource::File(path) => read_token_from_file(path)?,
        TokenSource::Stdin => read_token_from_stdin()?,
    };
    Ok(Some(token).filter(|t| !t.is_empty()))
}

/// Splits `key=value` on the first `=`; the value may itself contain `=`.
fn parse_parameter(src: &str) -> Result<(String, String), UsageError> {
    match src.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(UsageError::InvalidParameter(src.to_string())),
    }
}
