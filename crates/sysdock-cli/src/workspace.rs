//! Files the CLI works with: config, result log and the patch catalog.

use anyhow::{Context, Result};
use std::path::PathBuf;
use sysdock_core::{CONFIG_FILE, ConfigStore, LOG_FILE, PatchGroup, ResultLog};

pub struct Workspace {
    config_dir: PathBuf,
    catalog: Option<PathBuf>,
}

impl Workspace {
    /// `config_dir` defaults to `<user config dir>/sysdock`.
    pub fn new(config_dir: Option<PathBuf>, catalog: Option<PathBuf>) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("Failed to determine config directory")?
                .join("sysdock"),
        };
        Ok(Self {
            config_dir,
            catalog,
        })
    }

    pub fn config(&self) -> Result<ConfigStore> {
        let path = self.config_dir.join(CONFIG_FILE);
        ConfigStore::load(&path).with_context(|| format!("Failed to load {}", path.display()))
    }

    pub fn result_log(&self) -> ResultLog {
        ResultLog::new(self.config_dir.join(LOG_FILE))
    }

    pub fn groups(&self) -> Result<Vec<PatchGroup>> {
        match &self.catalog {
            Some(path) => sysdock_core::load_catalog(path)
                .with_context(|| format!("Failed to load catalog {}", path.display())),
            None => Ok(sysdock_core::builtin_groups()?),
        }
    }

    pub fn group(&self, name: &str) -> Result<PatchGroup> {
        let groups = self.groups()?;
        match sysdock_core::find_group(&groups, name) {
            Some(group) => Ok(group.clone()),
            None => {
                let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
                anyhow::bail!(
                    "Unknown patch group '{}', expected one of {}",
                    name,
                    names.join(", ")
                )
            }
        }
    }
}
