use serde::{Deserialize, Serialize};

use crate::{
    config::{builtin_color, ColorMap},
    types::{AvailabilityState, Rgb},
};

/// `users.getPresence` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub presence: Option<String>,
}

impl PresencePayload {
    pub fn is_active(&self) -> bool {
        self.presence.as_deref() == Some("active")
    }
}

/// `users.profile.get` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePayload {
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub status_text: Option<String>,
}

impl ProfilePayload {
    #[cfg(test)]
    pub fn with_status(text: &str) -> Self {
        Self {
            profile: Some(Profile {
                status_text: Some(text.to_string()),
            }),
        }
    }

    /// Free-text status, `None` when absent or blank.
    pub fn status_text(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|profile| profile.status_text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// `dnd.info` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DndPayload {
    #[serde(default)]
    pub snooze_enabled: bool,
    #[serde(default)]
    pub dnd_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Canonical state: Available, Away or DoNotDisturb.
    pub state: AvailabilityState,
    pub label: Option<String>,
    /// Lowercased label when it names a configured custom activity.
    pub activity: Option<String>,
    pub color: Rgb,
}

impl Resolution {
    pub fn display_state(&self) -> AvailabilityState {
        match &self.activity {
            Some(activity) => AvailabilityState::Custom(activity.clone()),
            None => self.state.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvailabilityResolver {
    colors: ColorMap,
}

impl AvailabilityResolver {
    pub fn new(colors: ColorMap) -> Self {
        Self { colors }
    }

    /// Maps fetched upstream data to a canonical state and display color.
    /// Assumes every fetch already succeeded.
    pub fn resolve(
        &self,
        presence: &PresencePayload,
        profile: &ProfilePayload,
        dnd: &DndPayload,
    ) -> Resolution {
        let mut state = if presence.is_active() {
            AvailabilityState::Available
        } else {
            AvailabilityState::Away
        };

        if dnd.snooze_enabled {
            state = AvailabilityState::DoNotDisturb;
        }

        let label = profile.status_text().map(str::to_string);
        let activity = label
            .as_deref()
            .filter(|label| self.colors.is_custom(label))
            .map(str::to_lowercase);
        let color = self.color_for(&state, label.as_deref());

        Resolution {
            state,
            label,
            activity,
            color,
        }
    }

    /// Label entry first, then the state entry; an unset (all zero) entry
    /// falls back to the built-in color of the canonical state when one
    /// exists.
    pub fn color_for(&self, state: &AvailabilityState, label: Option<&str>) -> Rgb {
        let entry = label
            .and_then(|label| self.colors.get(label))
            .or_else(|| self.colors.get(state.key()));

        match entry {
            Some(color) if !color.is_unset() => color,
            Some(color) => builtin_color(state).unwrap_or(color),
            None => builtin_color(state).unwrap_or_default(),
        }
    }
}
