use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

/// A missing channel reads as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// All channels zero means the color was left unset in configuration.
    pub fn is_unset(self) -> bool {
        self.red == 0 && self.green == 0 && self.blue == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AvailabilityState {
    Offline,
    Away,
    Available,
    DoNotDisturb,
    Custom(String),
}

impl AvailabilityState {
    /// Lowercase lookup key used by the color map and indicator identities.
    pub fn key(&self) -> &str {
        match self {
            Self::Offline => "offline",
            Self::Away => "away",
            Self::Available => "available",
            Self::DoNotDisturb => "donotdisturb",
            Self::Custom(label) => label,
        }
    }
}

impl Serialize for AvailabilityState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum CycleOutcome {
    NotRun,
    /// Gate closed: master off, weekend, or outside the active window.
    Suppressed,
    UpstreamOffline,
    Applied,
    Failed(String),
    /// Results arrived after the poller was stopped or restarted.
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceStatus {
    pub name: String,
    #[serde(rename = "masterOn")]
    pub master_on: bool,
    pub polling: bool,
    pub state: AvailabilityState,
    pub label: Option<String>,
    pub color: Option<Rgb>,
    #[serde(rename = "lastCycle")]
    pub last_cycle: CycleOutcome,
    #[serde(rename = "intervalMinutes")]
    pub interval_minutes: u32,
    pub indicators: BTreeMap<String, bool>,
}
