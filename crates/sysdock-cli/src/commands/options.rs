//! Options command: show or set run-wide options.

use anyhow::{Result, bail};
use sysdock_core::RunOptions;

use super::Switch;
use crate::workspace::Workspace;

pub fn run(ws: &Workspace, key: Option<&str>, state: Option<Switch>) -> Result<()> {
    let mut config = ws.config()?;

    match (key, state) {
        (Some(key), Some(state)) => {
            config.set_option(key, state.into())?;
            config.save()?;
        }
        (Some(_), None) => bail!("Missing value, expected on or off"),
        _ => {}
    }

    let options = RunOptions::load(&mut config);
    config.save_if_dirty()?;
    for (key, value) in option_values(&options) {
        println!("{:<16} {}", key, if value { "on" } else { "off" });
    }
    Ok(())
}

fn option_values(options: &RunOptions) -> [(&'static str, bool); 4] {
    [
        ("patch_sysmmc", options.patch_sysmmc),
        ("patch_emummc", options.patch_emummc),
        ("enable_logging", options.enable_logging),
        ("version_skip", options.version_skip),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_option_values_follow_keys() {
        let keys: Vec<&str> = option_values(&RunOptions::default())
            .iter()
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(keys, RunOptions::KEYS);
    }

    #[test]
    fn test_set_and_seed() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(Some(dir.path().to_path_buf()), None).unwrap();

        run(&ws, Some("version_skip"), Some(Switch::Off)).unwrap();
        let config = ws.config().unwrap();
        assert_eq!(config.get_bool("options", "version_skip"), Some(false));
        assert_eq!(config.get_bool("options", "patch_emummc"), Some(true));

        assert!(run(&ws, Some("bogus"), Some(Switch::On)).is_err());
        assert!(run(&ws, Some("version_skip"), None).is_err());
    }
}
