//! # Disk Cache

use anyhow::{anyhow, bail};
use burn::config::Config;
use burn::data::network::downloader;
use std::fs::{File, create_dir_all, remove_file};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Disk cache layout.
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Cache root; ``~/.cache/{root_cache_key}`` when unset.
    #[config(default = "None")]
    pub root_dir: Option<PathBuf>,

    /// Key for the root cache directory under ``~/.cache``.
    #[config(default = "\"resnet-arch\".to_string()")]
    pub root_cache_key: String,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// The base cache directory.
    ///
    /// Does not create it.
    pub fn base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(root) = &self.root_dir {
            return Ok(root.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| anyhow!("no home directory"))?;
        Ok(home.join(".cache").join(&self.root_cache_key))
    }

    /// Map a resource key to a cache path.
    ///
    /// Does not ensure that the path (or any of the parents) exist.
    pub fn resource_to_path(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.base_cache_dir()?;
        Ok(resource_key.iter().fold(path, |acc, s| acc.join(s)))
    }

    /// Map a resource key to a cache path and ensure the parent directory exists.
    pub fn ensure_resource_parent_dir(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_to_path(resource_key)?;
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Fetch a resource into the cache; a cached copy is reused.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let cache_file_path = self.ensure_resource_parent_dir(resource)?;
        try_cache_download_to_path(url, cache_file_path)
    }
}

/// Download a URL resource to a given path.
///
/// If the path already exists, does nothing.
///
/// # Returns
///
/// The cache path.
pub fn try_cache_download_to_path(
    url: &str,
    cache_file_path: PathBuf,
) -> anyhow::Result<PathBuf> {
    if cache_file_path.exists() {
        tracing::debug!(path = %cache_file_path.display(), "cache hit");
        return Ok(cache_file_path);
    }

    let file_name = cache_file_path
        .file_name()
        .ok_or_else(|| anyhow!("not a file path: {}", cache_file_path.display()))?
        .to_string_lossy()
        .to_string();

    tracing::info!(%url, path = %cache_file_path.display(), "downloading");
    let bytes = downloader::download_file_as_bytes(url, &file_name);
    write_all_or_remove(&cache_file_path, &bytes)?;

    Ok(cache_file_path)
}

fn write_all_or_remove(
    path: &Path,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let mut output_file = File::create(path)?;
    if let Err(err) = output_file.write_all(bytes) {
        remove_file(path)?;
        bail!("failed to write {}: {err}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new().with_root_dir(Some(dir.path().to_path_buf()));

        let key = vec!["weights".to_string(), "model.pth".to_string()];
        let path = cache.resource_to_path(&key).unwrap();
        assert_eq!(path, dir.path().join("weights").join("model.pth"));

        let path = cache.ensure_resource_parent_dir(&key).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn test_cached_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.pth");
        std::fs::write(&path, b"cached").unwrap();

        // An unreachable URL; a hit must not touch the network.
        let result = try_cache_download_to_path("http://invalid.invalid/weights.pth", path.clone());
        assert_eq!(result.unwrap(), path);
        assert_eq!(std::fs::read(&path).unwrap(), b"cached");
    }

    #[test]
    fn test_default_root() {
        let cache = DiskCacheConfig::default();
        assert_eq!(cache.root_cache_key, "resnet-arch");
        if let Ok(dir) = cache.base_cache_dir() {
            assert!(dir.ends_with(".cache/resnet-arch"));
        }
    }
}
