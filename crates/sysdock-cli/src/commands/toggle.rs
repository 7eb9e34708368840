//! Toggle command: switch a feature flag in the config.

use anyhow::Result;

use super::Switch;
use crate::workspace::Workspace;

pub fn run(ws: &Workspace, group: &str, key: &str, state: Switch) -> Result<()> {
    let group = ws.group(group)?;
    let mut config = ws.config()?;

    let cleared = config.set_feature(&group, key, state.into())?;
    config.save()?;

    println!(
        "{}.{} = {}",
        group.name,
        key,
        if bool::from(state) { "on" } else { "off" }
    );
    for other in cleared {
        println!("{}.{} = off (exclusive with {})", group.name, other, key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_toggle_is_exclusive_and_persisted() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(Some(dir.path().to_path_buf()), None).unwrap();

        run(&ws, "nvservices", "no_bw_downgrade", Switch::On).unwrap();
        run(&ws, "nvservices", "force_bw_downgrade", Switch::On).unwrap();

        let config = ws.config().unwrap();
        assert_eq!(config.get_bool("nvservices", "force_bw_downgrade"), Some(true));
        assert_eq!(config.get_bool("nvservices", "no_bw_downgrade"), Some(false));
    }

    #[test]
    fn test_toggle_unknown_key() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(Some(dir.path().to_path_buf()), None).unwrap();
        assert!(run(&ws, "usb", "no_bw_downgrade", Switch::On).is_err());
        assert!(run(&ws, "audio", "x", Switch::Off).is_err());
    }
}
