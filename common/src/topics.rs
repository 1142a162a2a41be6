pub const TOPIC_CMD_POWER: &str = "busylight/cmnd/power";

pub const TOPIC_STATE: &str = "busylight/state";
pub const TOPIC_INDICATOR_PREFIX: &str = "busylight/indicator";

pub fn indicator_topic(key: &str) -> String {
    format!("{TOPIC_INDICATOR_PREFIX}/{key}")
}
