use std::{
    io,
    path::{Path, PathBuf},
};

use geoposition::{GeoPosition, Padding};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "drone-rescue";

/// Overrides `store.database_url` when set.
pub const DATABASE_URL_ENV: &str = "DRONE_RESCUE_DATABASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// What happens to the last distance/duration readout when routing fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum RouteFailurePolicy {
    /// Keep showing the metrics of the previous successful route.
    #[default]
    Retain,
    /// Blank the readout.
    Clear,
}

/// Config structure for the daemon
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub store: StoreConfig,
    pub routing: RoutingConfig,
    pub positioning: PositioningConfig,
    pub map: MapConfig,
    pub telemetry: TelemetryConfig,
    pub on_route_failure: RouteFailurePolicy,
    /// Mirror error statuses as desktop notifications.
    pub notifications: bool,
}

/// Realtime database layout shared with the drone and the cockpit.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub database_url: String,
    pub target_path: String,
    /// Key holding the target longitude; producers disagree between `long` and `lng`.
    pub longitude_key: String,
    pub engine_path: String,
    pub flight_mode_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "https://drone-rescue-system-default-rtdb.firebaseio.com".to_owned(),
            target_path: "drone_status".to_owned(),
            longitude_key: "long".to_owned(),
            engine_path: "Engine".to_owned(),
            flight_mode_path: "FlightMode".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    pub service_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            service_url: "https://router.project-osrm.org".to_owned(),
            profile: "driving".to_owned(),
            timeout_secs: 20,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PositioningConfig {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    /// 0 requires a fresh fix for every sample.
    pub maximum_age_ms: u64,
    /// Used until the first fix arrives, and for good if positioning is denied.
    pub default_position: GeoPosition,
    pub desktop_id: String,
    pub distance_threshold_m: u32,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 5000,
            maximum_age_ms: 0,
            default_position: GeoPosition::new(51.505, -0.09),
            desktop_id: "drone-rescue-daemon".to_owned(),
            distance_threshold_m: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    pub initial_zoom: u8,
    pub recenter_zoom: u8,
    pub fit_padding: Padding,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_zoom: 13,
            recenter_zoom: 15,
            fit_padding: Padding::uniform(50),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub frame_interval_ms: u64,
    pub clock_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 500,
            clock_interval_ms: 1000,
        }
    }
}

impl DaemonConfig {
    /// `$XDG_CONFIG_HOME/drone-rescue/config.ron`
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|x| x.join(NAME))
            .or_else(|| dirs::home_dir().map(|p| p.join(".config").join(NAME)))
            .map(|dir| dir.join("config.ron"))
    }

    /// Reads the config at `path`, falling back to defaults if there is no file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_ron(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(contents)?)
    }

    pub fn apply_overrides(&mut self, database_url: Option<String>) {
        if let Some(url) = database_url.filter(|url| !url.trim().is_empty()) {
            self.store.database_url = url;
        }
    }
}
