use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    schedule::{TimeOfDay, TimeParseError, TimeWindow},
    types::{AvailabilityState, Rgb},
};

pub const DEFAULT_INTERVAL_MINUTES: u32 = 1;
pub const CANONICAL_COLOR_KEYS: [&str; 3] = ["available", "away", "donotdisturb"];

/// Built-in color for a canonical state. Offline and custom labels have none.
pub fn builtin_color(state: &AvailabilityState) -> Option<Rgb> {
    match state {
        AvailabilityState::Available => Some(Rgb::new(0, 144, 0)),
        AvailabilityState::Away => Some(Rgb::new(255, 191, 0)),
        AvailabilityState::DoNotDisturb => Some(Rgb::new(149, 0, 0)),
        AvailabilityState::Offline | AvailabilityState::Custom(_) => None,
    }
}

/// Accessory configuration as written by the user. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessoryConfig {
    pub name: String,
    #[serde(rename = "oAuthToken")]
    pub oauth_token: Option<String>,
    pub interval: i64,
    pub set_color_api: Option<String>,
    pub off_api: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status_colors: BTreeMap<String, ColorSetting>,
    pub weekend: bool,
    pub debug: bool,
    pub timezone: String,
    pub http_port: u16,
    pub mqtt: MqttConfig,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            name: "Presence".to_string(),
            oauth_token: None,
            interval: DEFAULT_INTERVAL_MINUTES as i64,
            set_color_api: None,
            off_api: None,
            start_time: None,
            end_time: None,
            status_colors: BTreeMap::new(),
            weekend: false,
            debug: false,
            timezone: "UTC".to_string(),
            http_port: 8080,
            mqtt: MqttConfig::default(),
        }
    }
}

/// One `statusColors` entry. Values that are not a color are kept so the
/// builder can skip and report them instead of rejecting the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSetting {
    Rgb(Rgb),
    Invalid(serde_json::Value),
}

impl From<Rgb> for ColorSetting {
    fn from(rgb: Rgb) -> Self {
        Self::Rgb(rgb)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
        }
    }
}

impl AccessoryConfig {
    /// Trims string values and turns blank optional values into `None`.
    pub fn sanitize(&mut self) {
        fn blank_to_none(value: &mut Option<String>) {
            *value = value
                .take()
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty());
        }

        blank_to_none(&mut self.oauth_token);
        blank_to_none(&mut self.set_color_api);
        blank_to_none(&mut self.off_api);
        blank_to_none(&mut self.start_time);
        blank_to_none(&mut self.end_time);

        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            self.name = "Presence".to_string();
        }

        self.timezone = self.timezone.trim().to_string();
        if self.timezone.is_empty() {
            self.timezone = "UTC".to_string();
        }

        self.mqtt.host = self.mqtt.host.trim().to_string();
    }

    pub fn has_credentials(&self) -> bool {
        self.oauth_token.is_some()
    }

    pub fn poll_config_builder(&self) -> PollCycleConfigBuilder {
        let mut builder = PollCycleConfig::builder()
            .interval_minutes(self.interval)
            .weekend_enabled(self.weekend)
            .debug(self.debug);

        for (key, setting) in &self.status_colors {
            builder = match setting {
                ColorSetting::Rgb(rgb) => builder.color(key.as_str(), *rgb),
                ColorSetting::Invalid(_) => builder.invalid_color(key.as_str()),
            };
        }
        if let Some(start) = &self.start_time {
            builder = builder.start_time(start);
        }
        if let Some(end) = &self.end_time {
            builder = builder.end_time(end);
        }
        builder
    }
}

/// Lowercase state-or-label key to RGB. Always holds the canonical keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorMap {
    entries: BTreeMap<String, Rgb>,
}

impl Default for ColorMap {
    fn default() -> Self {
        let entries = [
            AvailabilityState::Available,
            AvailabilityState::Away,
            AvailabilityState::DoNotDisturb,
        ]
        .into_iter()
        .filter_map(|state| builtin_color(&state).map(|rgb| (state.key().to_string(), rgb)))
        .collect();

        Self { entries }
    }
}

impl ColorMap {
    pub fn get(&self, key: &str) -> Option<Rgb> {
        self.entries.get(&key.to_lowercase()).copied()
    }

    /// Keys that are not one of the canonical states.
    pub fn custom_keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .keys()
            .map(String::as_str)
            .filter(|key| !CANONICAL_COLOR_KEYS.contains(key))
    }

    pub fn is_custom(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        !CANONICAL_COLOR_KEYS.contains(&key.as_str()) && self.entries.contains_key(&key)
    }

    fn insert(&mut self, key: &str, rgb: Rgb) {
        self.entries.insert(key.trim().to_lowercase(), rgb);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    #[error("ignoring start time {value:?}: {source}")]
    InvalidStartTime {
        value: String,
        #[source]
        source: TimeParseError,
    },
    #[error("ignoring end time {value:?}: {source}")]
    InvalidEndTime {
        value: String,
        #[source]
        source: TimeParseError,
    },
    #[error("poll interval {requested} minute(s) raised to {}", DEFAULT_INTERVAL_MINUTES)]
    IntervalCoerced { requested: i64 },
    #[error("ignoring color with blank key")]
    BlankColorKey,
    #[error("ignoring color {key:?}: expected red, green and blue between 0 and 255")]
    InvalidColor { key: String },
}

/// Immutable per-accessory polling configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollCycleConfig {
    pub interval_minutes: u32,
    pub window: TimeWindow,
    pub weekend_enabled: bool,
    pub colors: ColorMap,
    pub debug: bool,
}

impl Default for PollCycleConfig {
    fn default() -> Self {
        PollCycleConfig::builder().build()
    }
}

impl PollCycleConfig {
    pub fn builder() -> PollCycleConfigBuilder {
        PollCycleConfigBuilder::default()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

#[derive(Debug, Clone)]
pub struct PollCycleConfigBuilder {
    interval_minutes: i64,
    start_time: Option<String>,
    end_time: Option<String>,
    weekend_enabled: bool,
    colors: Vec<(String, Rgb)>,
    invalid_colors: Vec<String>,
    debug: bool,
}

impl Default for PollCycleConfigBuilder {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES as i64,
            start_time: None,
            end_time: None,
            weekend_enabled: false,
            colors: Vec::new(),
            invalid_colors: Vec::new(),
            debug: false,
        }
    }
}

impl PollCycleConfigBuilder {
    pub fn interval_minutes(mut self, minutes: i64) -> Self {
        self.interval_minutes = minutes;
        self
    }

    pub fn start_time(mut self, raw: impl Into<String>) -> Self {
        self.start_time = Some(raw.into());
        self
    }

    pub fn end_time(mut self, raw: impl Into<String>) -> Self {
        self.end_time = Some(raw.into());
        self
    }

    pub fn weekend_enabled(mut self, enabled: bool) -> Self {
        self.weekend_enabled = enabled;
        self
    }

    pub fn color(mut self, key: impl Into<String>, rgb: Rgb) -> Self {
        self.colors.push((key.into(), rgb));
        self
    }

    /// Records a color entry that could not be read; it is reported by
    /// `build_reporting` and otherwise ignored.
    pub fn invalid_color(mut self, key: impl Into<String>) -> Self {
        self.invalid_colors.push(key.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(self) -> PollCycleConfig {
        self.build_reporting().0
    }

    /// Builds the configuration, degrading malformed values permissively and
    /// reporting each degradation.
    pub fn build_reporting(self) -> (PollCycleConfig, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();

        let interval_minutes = if self.interval_minutes < 1 {
            warnings.push(ConfigWarning::IntervalCoerced {
                requested: self.interval_minutes,
            });
            DEFAULT_INTERVAL_MINUTES
        } else {
            u32::try_from(self.interval_minutes).unwrap_or(u32::MAX)
        };

        let start = self.start_time.and_then(|value| match value.parse::<TimeOfDay>() {
            Ok(time) => Some(time),
            Err(source) => {
                warnings.push(ConfigWarning::InvalidStartTime { value, source });
                None
            }
        });
        let end = self.end_time.and_then(|value| match value.parse::<TimeOfDay>() {
            Ok(time) => Some(time),
            Err(source) => {
                warnings.push(ConfigWarning::InvalidEndTime { value, source });
                None
            }
        });

        let mut colors = ColorMap::default();
        for (key, rgb) in self.colors {
            if key.trim().is_empty() {
                warnings.push(ConfigWarning::BlankColorKey);
                continue;
            }
            colors.insert(&key, rgb);
        }
        warnings.extend(
            self.invalid_colors
                .into_iter()
                .map(|key| ConfigWarning::InvalidColor { key }),
        );

        let config = PollCycleConfig {
            interval_minutes,
            window: TimeWindow { start, end },
            weekend_enabled: self.weekend_enabled,
            colors,
            debug: self.debug,
        };

        (config, warnings)
    }
}
