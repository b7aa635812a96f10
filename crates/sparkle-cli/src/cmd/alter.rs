//! `sparkle alter <itemId> <field> <value> [--json]`.
//!
//! `field` selects which endpoint the mutation maps to; every one of them
//! acts on the caller's own resolved identity (the daemon has no concept
//! of altering on someone else's behalf — see
//! `sparkle_daemon::handlers::current_person`), so `value` only ever
//! chooses a direction:
//!
//! - `status <value>`       -> `updateStatus` with `value` as the new status
//! - `monitoring on|off`    -> `addMonitor` / `removeMonitor`
//! - `visibility visible|ignored` -> `unignoreItem` / `ignoreItem`
//! - `responsibility taken|released` -> `takeItem` / `surrenderItem`

use crate::client::DaemonClient;
use crate::output::{render, OutputMode};
use clap::{Args, ValueEnum};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlterField {
    Status,
    Monitoring,
    Visibility,
    Responsibility,
}

#[derive(Args, Debug)]
pub struct AlterArgs {
    pub item_id: String,
    #[arg(value_enum)]
    pub field: AlterField,
    pub value: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &AlterArgs, repo_root: &Path) -> anyhow::Result<()> {
    let client = DaemonClient::ensure_running(repo_root)?;
    let item_id = &args.item_id;

    match args.field {
        AlterField::Status => {
            client.post_empty("/api/updateStatus", &serde_json::json!({"item_id": item_id, "status": args.value}))?;
        }
        AlterField::Monitoring => match args.value.as_str() {
            "on" => client.post_empty("/api/addMonitor", &serde_json::json!({"item_id": item_id}))?,
            "off" => client.post_empty("/api/removeMonitor", &serde_json::json!({"item_id": item_id}))?,
            other => anyhow::bail!("monitoring value must be `on` or `off`, got `{other}`"),
        },
        AlterField::Visibility => match args.value.as_str() {
            "visible" => client.post_empty("/api/unignoreItem", &serde_json::json!({"item_id": item_id}))?,
            "ignored" => client.post_empty("/api/ignoreItem", &serde_json::json!({"item_id": item_id}))?,
            other => anyhow::bail!("visibility value must be `visible` or `ignored`, got `{other}`"),
        },
        AlterField::Responsibility => match args.value.as_str() {
            "taken" => client.post_empty("/api/takeItem", &serde_json::json!({"item_id": item_id}))?,
            "released" => client.post_empty("/api/surrenderItem", &serde_json::json!({"item_id": item_id}))?,
            other => anyhow::bail!("responsibility value must be `taken` or `released`, got `{other}`"),
        },
    }

    let mode = OutputMode::from_flag(args.json);
    render(mode, &serde_json::json!({"itemId": item_id, "field": format!("{:?}", args.field), "value": args.value}), |_, w| {
        writeln!(w, "{item_id}: {:?} -> {}", args.field, args.value)
    })
}
