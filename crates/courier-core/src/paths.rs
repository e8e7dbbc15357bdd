use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInputs {
    pub home_dir: PathBuf,
    pub courier_dir_override: Option<PathBuf>,
}

/// Filesystem locations courier reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourierPaths {
    /// Base directory; also where the log file lands.
    pub courier_dir: PathBuf,
    pub config_file: PathBuf,
}

pub fn compute_paths(inputs: PathInputs) -> CourierPaths {
    let courier_dir = inputs
        .courier_dir_override
        .unwrap_or_else(|| inputs.home_dir.join(".courier"));

    CourierPaths {
        config_file: courier_dir.join("config.json"),
        courier_dir,
    }
}
