use anyhow::Context as _;
use courier_core::config::ConfigFile;
use courier_core::paths::CourierPaths;

/// Load the config file, creating it with empty defaults when absent.
pub async fn load(paths: &CourierPaths) -> anyhow::Result<ConfigFile> {
    if !paths.config_file.exists() {
        let defaults = ConfigFile::default();
        save(paths, &defaults).await?;
        return Ok(defaults);
    }

    let data = tokio::fs::read_to_string(&paths.config_file)
        .await
        .with_context(|| format!("read {}", paths.config_file.display()))?;
    let config: ConfigFile = serde_json::from_str(&data)
        .with_context(|| format!("parse {}", paths.config_file.display()))?;
    Ok(config)
}

/// Persist the config atomically: write a sibling tmp file, then rename.
pub async fn save(paths: &CourierPaths, config: &ConfigFile) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&paths.courier_dir)
        .await
        .with_context(|| format!("create {}", paths.courier_dir.display()))?;

    let tmp = paths.config_file.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(config).context("serialize config")?;

    tokio::fs::write(&tmp, &data)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &paths.config_file)
        .await
        .with_context(|| {
            format!("rename {} -> {}", tmp.display(), paths.config_file.display())
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::paths::{compute_paths, PathInputs};

    fn temp_paths(dir: &tempfile::TempDir) -> CourierPaths {
        compute_paths(PathInputs {
            home_dir: dir.path().to_path_buf(),
            courier_dir_override: Some(dir.path().join("courier")),
        })
    }

    #[tokio::test]
    async fn missing_file_creates_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = temp_paths(&dir);

        let config = load(&paths).await.unwrap();
        assert_eq!(config, ConfigFile::default());
        assert!(paths.config_file.exists());
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = temp_paths(&dir);

        let (config, _) = ConfigFile::default()
            .add_project("demo", "/tmp/demo", Some("a demo"))
            .unwrap();
        let config = config.bind_channel("42", "demo").unwrap();

        save(&paths, &config).await.unwrap();
        let loaded = load(&paths).await.unwrap();
        assert_eq!(loaded, config);
    }
}
