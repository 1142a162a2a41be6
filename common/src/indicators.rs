use std::{borrow::Cow, collections::BTreeMap};

use serde::Serialize;

use crate::{
    config::{ColorMap, CANONICAL_COLOR_KEYS},
    types::AvailabilityState,
};

const ACTIVITY_KEY_PREFIX: &str = "activity/";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndicatorId {
    Offline,
    Away,
    Available,
    DoNotDisturb,
    Activity(String),
}

impl IndicatorId {
    pub const CANONICAL: [IndicatorId; 4] = [
        IndicatorId::Offline,
        IndicatorId::Away,
        IndicatorId::Available,
        IndicatorId::DoNotDisturb,
    ];

    /// Stable identity used for status maps and MQTT topics. Activities
    /// live under `activity/` so a custom "offline" cannot shadow the
    /// canonical switch.
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            Self::Offline => Cow::Borrowed("offline"),
            Self::Away => Cow::Borrowed("away"),
            Self::Available => Cow::Borrowed("available"),
            Self::DoNotDisturb => Cow::Borrowed("donotdisturb"),
            Self::Activity(name) => Cow::Owned(format!("{ACTIVITY_KEY_PREFIX}{name}")),
        }
    }

    /// Name shown by the host, e.g. `Switch Away - Desk`.
    pub fn display_name(&self, accessory: &str) -> String {
        let label = match self {
            Self::Offline => "Offline",
            Self::Away => "Away",
            Self::Available => "Available",
            Self::DoNotDisturb => "DnD",
            Self::Activity(key) => key,
        };
        format!("Switch {label} - {accessory}")
    }

    fn for_state(state: &AvailabilityState) -> Self {
        match state {
            AvailabilityState::Away => Self::Away,
            AvailabilityState::Available => Self::Available,
            AvailabilityState::DoNotDisturb => Self::DoNotDisturb,
            AvailabilityState::Offline | AvailabilityState::Custom(_) => Self::Offline,
        }
    }
}

impl Serialize for IndicatorId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorChange {
    pub id: IndicatorId,
    pub on: bool,
}

/// Boolean switches, one per canonical state plus one per custom activity.
///
/// Reconciliation keeps exactly one switch on: the matching activity switch
/// when the label names one, otherwise the canonical switch for the state.
/// Every mutation returns only the switches whose value actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSet {
    switches: BTreeMap<IndicatorId, bool>,
}

impl IndicatorSet {
    pub fn new<'a>(activities: impl IntoIterator<Item = &'a str>) -> Self {
        let mut switches: BTreeMap<IndicatorId, bool> = IndicatorId::CANONICAL
            .iter()
            .cloned()
            .map(|id| (id, false))
            .collect();

        for activity in activities {
            let key = activity.trim().to_lowercase();
            if key.is_empty() || CANONICAL_COLOR_KEYS.contains(&key.as_str()) {
                continue;
            }
            switches.insert(IndicatorId::Activity(key), false);
        }

        Self { switches }
    }

    pub fn from_colors(colors: &ColorMap) -> Self {
        Self::new(colors.custom_keys())
    }

    pub fn get(&self, id: &IndicatorId) -> Option<bool> {
        self.switches.get(id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &IndicatorId> {
        self.switches.keys()
    }

    #[cfg(test)]
    pub fn active(&self) -> Option<&IndicatorId> {
        self.switches
            .iter()
            .find_map(|(id, on)| on.then_some(id))
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.switches
            .iter()
            .map(|(id, on)| (id.key().to_string(), *on))
            .collect()
    }

    pub fn reconcile(
        &mut self,
        state: &AvailabilityState,
        label: Option<&str>,
    ) -> Vec<IndicatorChange> {
        let label = label.or(match state {
            AvailabilityState::Custom(label) => Some(label.as_str()),
            _ => None,
        });

        let activity = label
            .map(|label| IndicatorId::Activity(label.trim().to_lowercase()))
            .filter(|id| self.switches.contains_key(id));

        let target = activity.unwrap_or_else(|| IndicatorId::for_state(state));
        self.apply(|id| *id == target)
    }

    pub fn all_off(&mut self) -> Vec<IndicatorChange> {
        self.apply(|_| false)
    }

    fn apply(&mut self, target: impl Fn(&IndicatorId) -> bool) -> Vec<IndicatorChange> {
        let mut changes = Vec::new();
        for (id, on) in self.switches.iter_mut() {
            let wanted = target(id);
            if *on != wanted {
                *on = wanted;
                changes.push(IndicatorChange {
                    id: id.clone(),
                    on: wanted,
                });
            }
        }
        changes
    }
}
