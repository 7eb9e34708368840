//! Log command and result rendering.

use anyhow::Result;
use owo_colors::OwoColorize;
use sysdock_core::RunReport;
use sysdock_core::results::STATS_SECTION;

use crate::workspace::Workspace;

pub fn run(ws: &Workspace) -> Result<()> {
    let log = ws.result_log();
    let Some(table) = log.load()? else {
        println!("No result log at {}", log.path().display());
        return Ok(());
    };
    for line in render_log(&table) {
        println!("{}", line);
    }
    Ok(())
}

pub fn print_report(report: &RunReport) {
    for group in &report.groups {
        println!();
        println!("{} {}", group.name.bold(), format!("({})", group.status).dimmed());
        for (name, outcome) in group.entries() {
            println!("  {:<40} {}", name, paint(outcome.as_str()));
        }
    }
    println!();
}

fn render_log(table: &toml::Table) -> Vec<String> {
    let mut lines = Vec::new();
    for (section, value) in table {
        let Some(entries) = value.as_table() else {
            continue;
        };
        if section == STATS_SECTION {
            continue;
        }
        lines.push(format!("{}", section.bold()));
        for (name, outcome) in entries {
            let outcome = outcome.as_str().unwrap_or("?");
            lines.push(format!("  {:<40} {}", name, paint(outcome)));
        }
    }
    if let Some(stats) = table.get(STATS_SECTION).and_then(|v| v.as_table()) {
        lines.push(format!("{}", STATS_SECTION.bold()));
        for (key, value) in stats {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("  {:<20} {}", key.dimmed(), value));
        }
    }
    lines
}

fn paint(outcome: &str) -> String {
    if outcome.starts_with("Patched") {
        outcome.green().to_string()
    } else if outcome.starts_with("Failed") {
        outcome.red().to_string()
    } else if outcome == "Unpatched" {
        outcome.yellow().to_string()
    } else {
        outcome.dimmed().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"
[stats]
fw_version = "13.0.0"
buffer_size = 4096

[usb]
"12.0.0-14.1.2 force_dp_mode_c" = "Patched (sysdock)"
"15.0.0+ force_dp_mode_c" = "Skipped"
"#;

    #[test]
    fn test_render_log_puts_stats_last() {
        let table: toml::Table = LOG.parse().unwrap();
        let lines = render_log(&table);
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("usb"));
        assert!(lines[1].contains("12.0.0-14.1.2 force_dp_mode_c"));
        assert!(lines[1].contains("Patched (sysdock)"));
        assert!(lines[3].contains("stats"));
        assert!(lines[4].ends_with("4096"));
        assert!(lines[5].ends_with("13.0.0"));
    }

    #[test]
    fn test_paint_keeps_text() {
        for outcome in ["Patched (file)", "Failed (write)", "Unpatched", "Disabled"] {
            assert!(paint(outcome).contains(outcome));
        }
    }
}
