use std::io;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("bearx requires macOS to open Bear URLs")]
    UnsupportedPlatform,
    #[error("failed to run open: {0}")]
    Spawn(#[source] io::Error),
    #[error("open exited with {0}")]
    Status(ExitStatus),
    #[error("{0}")]
    Other(String),
}

/// Hands a URL to whatever application is registered for its scheme.
///
/// Succeeding only means the application was launched; whether the action worked is
/// reported later through the callback.
pub trait UrlOpener {
    fn open(&self, url: &str) -> Result<(), OpenError>;
}

impl<F> UrlOpener for F
where
    F: Fn(&str) -> Result<(), OpenError>,
{
    fn open(&self, url: &str) -> Result<(), OpenError> {
        self(url)
    }
}
