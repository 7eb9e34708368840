//! Catalog command: show or export the patch groups.

use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use sysdock_core::{ConfigStore, PatchGroup};

use crate::workspace::Workspace;

pub fn run(ws: &Workspace, json: bool, export: Option<&Path>) -> Result<()> {
    let groups = ws.groups()?;

    if let Some(path) = export {
        sysdock_core::save_catalog(path, &groups)?;
        println!("Exported {} patch groups to {}", groups.len(), path.display());
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    let config = ws.config()?;
    for group in &groups {
        print_group(group, &config);
    }
    Ok(())
}

fn print_group(group: &PatchGroup, config: &ConfigStore) {
    println!(
        "{} {} {}",
        group.name.bold(),
        format!("target {}", group.target_id).dimmed(),
        format!("fw {}", group.target_versions).dimmed()
    );
    for key in group.config_keys() {
        let state = if feature_state(group, config, key) {
            "on".green().to_string()
        } else {
            "off".red().to_string()
        };
        println!("  {} = {}", key, state);
        for t in group.templates.iter().filter(|t| t.config_key == key) {
            println!(
                "    {:<36} {:<22} fw {:<16} {}",
                t.name,
                t.condition,
                t.target_versions.to_string(),
                t.pattern.dimmed()
            );
        }
    }
    println!();
}

/// Configured value of `key`, falling back to the first template's default.
fn feature_state(group: &PatchGroup, config: &ConfigStore, key: &str) -> bool {
    config.get_bool(&group.name, key).unwrap_or_else(|| {
        group
            .templates
            .iter()
            .find(|t| t.config_key == key)
            .is_some_and(|t| t.enabled)
    })
}
