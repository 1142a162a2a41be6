pub mod availability;
pub mod config;
pub mod indicators;
pub mod schedule;
pub mod topics;
pub mod types;

pub use availability::{
    AvailabilityResolver, DndPayload, PresencePayload, Profile, ProfilePayload, Resolution,
};
pub use config::{
    AccessoryConfig, ColorMap, ColorSetting, ConfigWarning, MqttConfig, PollCycleConfig,
};
pub use indicators::{IndicatorChange, IndicatorId, IndicatorSet};
pub use schedule::{PollGate, TimeOfDay, TimeWindow};
pub use topics::*;
pub use types::{AvailabilityState, CycleOutcome, PresenceStatus, Rgb};
