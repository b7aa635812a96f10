//! `sparkle browser`: ensure the daemon is running, open the
//! OS default browser at its address.

use crate::client::DaemonClient;
use std::path::Path;

pub fn run(repo_root: &Path) -> anyhow::Result<()> {
    let client = DaemonClient::ensure_running(repo_root)?;
    sparkle_daemon::lifecycle::open_browser(client.base_url());
    Ok(())
}
