use std::env;
use std::fs;
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("HOME is not set")]
    MissingHome,
    #[error("empty token file path")]
    EmptyTokenPath,
    #[error("read token file {path}: {source}")]
    ReadTokenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("--token-stdin requires non-interactive stdin")]
    InteractiveStdin,
    #[error("read token from stdin: {0}")]
    ReadStdin(#[source] io::Error),
}

pub fn home_dir() -> Result<PathBuf, InputError> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or(InputError::MissingHome)
}

/// Expands a leading `~` or `~/` to the home directory.
pub fn expand_path(raw_path: &str) -> Result<PathBuf, InputError> {
    if raw_path == "~" {
        return home_dir();
    }
    if let Some(rest) = raw_path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(raw_path))
}

pub fn read_token_from_file(raw_path: &str) -> Result<String, InputError> {
    if raw_path.trim().is_empty() {
        return Err(InputError::EmptyTokenPath);
    }
    let path = expand_path(raw_path)?;
    let text = fs::read_to_string(&path)
        .map_err(|source| InputError::ReadTokenFile { path, source })?;
    Ok(text.trim().to_string())
}

pub fn read_token_from_stdin() -> Result<String, InputError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(InputError::InteractiveStdin);
    }
    read_token_line(stdin.lock())
}

/// Reads the first line; a missing trailing newline is fine.
pub fn read_token_line<R: BufRead>(mut reader: R) -> Result<String, InputError> {
    let mut line = String::new();
    reader.read_line(&mut line).map_err(InputError::ReadStdin)?;
    Ok(line.trim().to_string())
}
