//! `sparkle cat <itemId> [--json]`: pretty-print one aggregate.

use crate::client::DaemonClient;
use crate::output::{render, OutputMode};
use clap::Args;
use sparkle_daemon::json::ItemDetailsDto;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct CatArgs {
    pub item_id: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &CatArgs, repo_root: &Path) -> anyhow::Result<()> {
    let client = DaemonClient::ensure_running(repo_root)?;
    let details: ItemDetailsDto = client.post("/api/getItemDetails", &serde_json::json!({"item_id": args.item_id}))?;
    let mode = OutputMode::from_flag(args.json);
    render(mode, &details, |d, w| {
        let agg = &d.aggregate;
        writeln!(w, "{}  {}", agg.item_id.as_str(), agg.tagline)?;
        writeln!(w, "status:   {}", agg.status)?;
        writeln!(w, "created:  {} by {}", agg.created, agg.person.name)?;
        if let Some(taker) = &agg.taken_by {
            writeln!(w, "taken by: {}", taker.name)?;
        }
        if !agg.dependencies.is_empty() {
            let deps: Vec<&str> = agg.dependencies.iter().map(sparkle_core::ItemId::as_str).collect();
            writeln!(w, "needs:    {}", deps.join(", "))?;
        }
        if !agg.dependents.is_empty() {
            let deps: Vec<&str> = agg.dependents.iter().map(sparkle_core::ItemId::as_str).collect();
            writeln!(w, "needed by: {}", deps.join(", "))?;
        }
        if agg.ignored {
            writeln!(w, "(ignored)")?;
        }
        for entry in &agg.entries {
            writeln!(w, "- {}: {}", entry.person.name, entry.text)?;
        }
        Ok(())
    })
}
