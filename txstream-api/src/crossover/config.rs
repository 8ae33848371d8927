use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;

const DEFAULT_POLL: Duration = Duration::from_secs(10);
const DEFAULT_LISTEN_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Settings of one crossover run. Durations are given in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    pub token: Option<String>,
    #[serde(with = "seconds")]
    pub poll: Duration,
    /// Height to start from when no checkpoint exists.
    pub from: u64,
    /// Base filter, as a bare query or a full `{"v": 3, "q": ...}` envelope.
    pub query: Value,
    #[serde(with = "seconds")]
    pub listen_idle_timeout: Duration,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            token: None,
            poll: DEFAULT_POLL,
            from: 0,
            query: json!({ "find": {} }),
            listen_idle_timeout: DEFAULT_LISTEN_IDLE_TIMEOUT,
        }
    }
}

mod seconds {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
