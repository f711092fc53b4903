use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

/// Settings for full dataset generation and its on-disk cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DagConfig {
    /// Directory holding `full-R<revision>-<seed>` dataset files.
    pub dataset_dir: PathBuf,
    /// Regenerate even when a valid dataset file already exists.
    pub force_create: bool,
    /// Dataset files kept on disk, counting the current epoch. 0 keeps all.
    pub datasets_on_disk: usize,
    /// Dataset generation workers. 0 lets rayon decide.
    pub threads: usize,
    /// Light handles kept in memory by [`crate::store::DagStore`].
    pub caches_in_mem: usize,
    /// Full handles kept in memory by [`crate::store::DagStore`].
    pub datasets_in_mem: usize,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            dataset_dir: default_dataset_dir(),
            force_create: false,
            datasets_on_disk: 2,
            threads: num_cpus::get(),
            caches_in_mem: 2,
            datasets_in_mem: 1,
        }
    }
}

impl DagConfig {
    pub fn with_dataset_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dataset_dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

pub fn default_dataset_dir() -> PathBuf {
    dataset_dir_under(dirs::home_dir())
}

fn dataset_dir_under(home: Option<PathBuf>) -> PathBuf {
    let home = match home {
        Some(home) => home,
        None => {
            warn!("No home directory found, keeping DAGs relative to the working directory");
            PathBuf::new()
        }
    };
    if cfg!(windows) {
        home.join("AppData").join("Huchash")
    } else {
        home.join(".huchash")
    }
}
