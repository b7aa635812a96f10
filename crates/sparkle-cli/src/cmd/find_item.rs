//! `sparkle find-item <substr> [--json]`: list matching items.

use crate::client::DaemonClient;
use crate::output::{render, OutputMode};
use clap::Args;
use sparkle_core::state::Aggregate;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct FindItemArgs {
    pub substr: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &FindItemArgs, repo_root: &Path) -> anyhow::Result<()> {
    let client = DaemonClient::ensure_running(repo_root)?;
    let encoded = urlencode(&args.substr);
    let items: Vec<Aggregate> = client.get(&format!("/api/allItems?search={encoded}"))?;
    let mode = OutputMode::from_flag(args.json);
    render(mode, &items, |items, w| {
        for item in items {
            writeln!(w, "{}  {}", item.item_id.as_str(), item.tagline)?;
        }
        Ok(())
    })
}

/// Percent-encode a search substring for safe inclusion in a query string.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
