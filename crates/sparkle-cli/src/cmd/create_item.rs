//! `sparkle create-item "<tagline>" [--json]`: prints new id.

use crate::client::DaemonClient;
use crate::output::{render, OutputMode};
use clap::Args;
use sparkle_daemon::json::CreateItemResponse;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct CreateItemArgs {
    pub tagline: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &CreateItemArgs, repo_root: &Path) -> anyhow::Result<()> {
    let client = DaemonClient::ensure_running(repo_root)?;
    let response: CreateItemResponse =
        client.post("/api/createItem", &serde_json::json!({"tagline": args.tagline}))?;
    let mode = OutputMode::from_flag(args.json);
    render(mode, &response, |r, w| writeln!(w, "{}", r.item_id))
}
