//! `sparkle inspect <itemId> [--json]`: full DAG relative to id.

use crate::client::DaemonClient;
use crate::output::{render, OutputMode};
use clap::Args;
use sparkle_daemon::json::DagEmissionDto;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct InspectArgs {
    pub item_id: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &InspectArgs, repo_root: &Path) -> anyhow::Result<()> {
    let client = DaemonClient::ensure_running(repo_root)?;
    let nodes: Vec<DagEmissionDto> = client.get(&format!("/api/dag?referenceId={}", args.item_id))?;
    let mode = OutputMode::from_flag(args.json);
    render(mode, &nodes, |nodes, w| {
        for node in nodes {
            let indent = "  ".repeat(node.depth as usize);
            match &node.needed_by {
                Some(parent) => writeln!(w, "{indent}{} (needed by {})", node.item.as_str(), parent.as_str())?,
                None => writeln!(w, "{indent}{}", node.item.as_str())?,
            }
        }
        Ok(())
    })
}
