use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geo::Coordinate;
use crate::{Error, Result};

/// Contents of `geotag.toml`. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeotagConfig {
    pub database: Option<String>,
    pub default_location: Option<Coordinate>,
    pub geocoder: GeocoderConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub nominatim_url: String,
    pub google_url: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: format!("geotag/{}", env!("CARGO_PKG_VERSION")),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            google_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
        }
    }
}

impl GeocoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime; unset keeps entries until invalidated
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8787 }
    }
}

/// Search center used when nothing better can be resolved
pub const DEFAULT_LOCATION: Coordinate = Coordinate {
    latitude: 51.45400691006,
    longitude: -0.1332313840429,
};

impl GeotagConfig {
    /// Configured default location, checked for range.
    pub fn default_location(&self) -> Result<Coordinate> {
        match self.default_location {
            Some(c) => Coordinate::new(c.latitude, c.longitude)
                .map_err(|e| Error::Config(format!("invalid default_location: {}", e))),
            None => Ok(DEFAULT_LOCATION),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("geotag.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from(".geotag").join("geotag.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<GeotagConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: GeotagConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &GeotagConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geotag.toml");
        std::fs::write(
            &path,
            "database = \"geo.db\"\n\n[geocoder]\ntimeout_secs = 3\n\n[default_location]\nlatitude = 40.0\nlongitude = -74.0\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.database_path(), PathBuf::from("geo.db"));
        assert_eq!(config.geocoder.timeout(), Duration::from_secs(3));
        assert!(config.geocoder.nominatim_url.contains("nominatim"));
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.default_location().unwrap(), Coordinate { latitude: 40.0, longitude: -74.0 });
    }

    #[test]
    fn test_invalid_default_location_is_config_error() {
        let config = GeotagConfig {
            default_location: Some(Coordinate { latitude: 100.0, longitude: 0.0 }),
            ..GeotagConfig::default()
        };
        assert!(matches!(config.default_location(), Err(Error::Config(_))));
        assert_eq!(GeotagConfig::default().default_location().unwrap(), DEFAULT_LOCATION);
    }

    #[test]
    fn test_ensure_db_dir_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "").unwrap();

        assert!(ensure_db_dir(&dir.path().join("nested").join("geo.db")).is_ok());
        assert!(dir.path().join("nested").is_dir());
        assert!(matches!(ensure_db_dir(&blocker.join("sub").join("geo.db")), Err(Error::Io(_))));
    }

    #[test]
    fn test_write_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geotag.toml");
        write_config(&path, &GeotagConfig::default(), false).unwrap();
        assert!(write_config(&path, &GeotagConfig::default(), false).is_err());
        assert!(write_config(&path, &GeotagConfig::default(), true).is_ok());
        assert!(load_config(Some(&path)).unwrap().is_some());
    }
}
