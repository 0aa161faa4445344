//! Exit-node preferences in the relay configuration file
//!
//! Preferences are appended, never merged: the relay honours the last
//! `ExitNodes` line it reads, so re-applying simply adds a newer block.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tornet_core::ExitCountries;
use tornet_core::Result;
use tracing::info;

/// Comment line opening every block we append
pub const MARKER: &str = "# tornet exit-node preferences";

/// Render the block appended for `countries`
///
/// Country codes are wrapped in braces, as the relay expects for
/// country selectors.
pub fn render_exit_policy(countries: &ExitCountries) -> String {
    let nodes = countries
        .codes()
        .iter()
        .map(|code| format!("{{{}}}", code))
        .collect::<Vec<_>>()
        .join(",");

    format!("\n{}\nExitNodes {}\nStrictNodes 1\n", MARKER, nodes)
}

/// Append the exit policy block to the file at `path`
///
/// The file is created if missing.
pub async fn append_exit_policy(path: &Path, countries: &ExitCountries) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    file.write_all(render_exit_policy(countries).as_bytes()).await?;
    file.flush().await?;

    info!("Exit countries set to {} in {}", countries, path.display());
    Ok(())
}
