//! `sparkle add-entry <itemId> [--json]`: stdin -> text, append
//! entry.

use crate::client::DaemonClient;
use crate::output::{render, OutputMode};
use clap::Args;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Args, Debug)]
pub struct AddEntryArgs {
    pub item_id: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &AddEntryArgs, repo_root: &Path) -> anyhow::Result<()> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    let text = text.trim_end_matches('\n').to_string();

    let client = DaemonClient::ensure_running(repo_root)?;
    client.post_empty(
        "/api/addEntry",
        &serde_json::json!({"item_id": args.item_id, "text": text}),
    )?;

    let mode = OutputMode::from_flag(args.json);
    render(mode, &serde_json::json!({"itemId": args.item_id, "added": true}), |_, w| {
        writeln!(w, "entry added to {}", args.item_id)
    })
}
