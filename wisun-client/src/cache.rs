//! JSON file cache of the last joined PAN

use std::io;
use std::path::{Path, PathBuf};
use wisun_core::{NetworkInfo, WiSunError, WiSunResult};

/// Persists [`NetworkInfo`] so that the next start can join without scanning
#[derive(Debug, Clone)]
pub struct NetworkInfoCache {
    path: PathBuf,
}

impl NetworkInfoCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached network info
    ///
    /// A missing, unreadable or unusable file is treated as absent.
    pub async fn load(&self) -> Option<NetworkInfo> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No network info cache at {}", self.path.display());
                return None;
            }
            Err(e) => {
                log::warn!("Cannot read {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<NetworkInfo>(&contents) {
            Ok(info) if info.is_usable() => {
                log::info!("Loaded network info from {}", self.path.display());
                Some(info)
            }
            Ok(_) => {
                log::warn!("Ignoring incomplete network info in {}", self.path.display());
                None
            }
            Err(e) => {
                log::warn!("Ignoring unparsable {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Write `info`, replacing any previous contents
    pub async fn store(&self, info: &NetworkInfo) -> WiSunResult<()> {
        let json = serde_json::to_string_pretty(info)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| WiSunError::CacheWrite {
                path: self.path.display().to_string(),
                source,
            })?;
        log::info!("Saved network info to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wisun-cache-{}-{}.json", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let path = temp_path("store");
        let cache = NetworkInfoCache::new(&path);
        let mut info = NetworkInfo::new("21", "8888", "12345678ABCDEF01");
        info.lqi = Some("E1".to_string());

        cache.store(&info).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("\"PanID\""));
        assert!(raw.contains("\"Channel\""));

        assert_eq!(cache.load().await, Some(info));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let cache = NetworkInfoCache::new(temp_path("missing"));
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_garbage_and_incomplete_files_are_absent() {
        let path = temp_path("garbage");
        tokio::fs::write(&path, "not json").await.unwrap();
        assert!(NetworkInfoCache::new(&path).load().await.is_none());

        tokio::fs::write(&path, r#"{"Channel":"21","Pan ID":"8888"}"#)
            .await
            .unwrap();
        assert!(NetworkInfoCache::new(&path).load().await.is_none());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_store_into_missing_directory_fails() {
        let cache = NetworkInfoCache::new(temp_path("dir").join("nested").join("cache.json"));
        let info = NetworkInfo::new("21", "8888", "12345678ABCDEF01");
        assert!(matches!(
            cache.store(&info).await,
            Err(WiSunError::CacheWrite { .. })
        ));
    }
}
