use crate::client::{OpenError, UrlOpener};
use std::process::Command;
use tracing::debug;

/// Opens URLs through the macOS `open` command, which routes them via Launch Services.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<(), OpenError> {
        if !cfg!(target_os = "macos") {
            return Err(OpenError::UnsupportedPlatform);
        }

        debug!(%url, "opening url");
        let status = Command::new("open")
            .arg(url)
            .status()
            .map_err(OpenError::Spawn)?;
        if !status.success() {
            return Err(OpenError::Status(status));
        }
        Ok(())
    }
}
