use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Human-readable duration (e.g., "200ms", "5s", "1m").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_millis(millis: u64) -> Self {
        HumanDuration(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("Missing unit in duration: {}", s))?;
        let (num_str, unit) = s.split_at(split);

        let num: u64 = num_str
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "us" => Duration::from_micros(num),
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(num * 60),
            "h" => Duration::from_secs(num * 3600),
            _ => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.0.as_micros();
        if micros % 1000 != 0 {
            write!(f, "{}us", micros)
        } else if self.0.as_millis() < 1000 || self.0.as_millis() % 1000 != 0 {
            write!(f, "{}ms", self.0.as_millis())
        } else {
            write!(f, "{}s", self.0.as_secs())
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HumanDuration::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Workload shape shared by every stressor on every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Stressor threads per node.
    pub num_threads: u32,
    /// Number of nodes running stressors.
    pub group_size: u32,
    /// Key ids assigned to each stressor range.
    pub num_entries: u64,
    /// First key id of the key space.
    pub key_id_offset: i64,
    /// All stressors operate on one shared range instead of disjoint ones.
    pub shared_keys: bool,
    /// Logical operations per transaction; 0 disables transactions.
    pub transaction_size: u32,
    pub put_ratio: u32,
    pub remove_ratio: u32,
    pub get_ratio: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            num_threads: 4,
            group_size: 1,
            num_entries: 64,
            key_id_offset: 0,
            shared_keys: true,
            transaction_size: 0,
            put_ratio: 1,
            remove_ratio: 1,
            get_ratio: 0,
        }
    }
}

/// Settings of the shared log value logic and its checkers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogLogicConfig {
    /// Maximum number of stressor entries kept in one log value.
    pub value_max_size: usize,
    /// Number of checkers confirming operations; the checked floor is their minimum.
    pub checkers: u32,
    /// Pause between two checker passes.
    pub check_interval: HumanDuration,
    /// Pause before retrying an attempt that could not fit into `value_max_size`.
    pub retry_backoff: HumanDuration,
}

impl Default for LogLogicConfig {
    fn default() -> Self {
        LogLogicConfig {
            value_max_size: 50,
            checkers: 1,
            check_interval: HumanDuration::from_millis(10),
            retry_backoff: HumanDuration::from_millis(1),
        }
    }
}

/// Top-level stress configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StressConfig {
    pub general: GeneralConfig,
    pub log_logic: LogLogicConfig,
}

impl StressConfig {
    /// Number of stressors across all nodes; stressor ids are `0..worker_population()`.
    ///
    /// Saturates on overflow; [`StressConfig::validate`] rejects such configs.
    pub fn worker_population(&self) -> u32 {
        self.checked_worker_population().unwrap_or(u32::MAX)
    }

    pub fn checked_worker_population(&self) -> Option<u32> {
        self.general.num_threads.checked_mul(self.general.group_size)
    }

    pub fn is_transactional(&self) -> bool {
        self.general.transaction_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration_parsing() {
        assert_eq!(
            HumanDuration::from_str("200ms").unwrap().as_duration(),
            Duration::from_millis(200)
        );
        assert_eq!(
            HumanDuration::from_str("5s").unwrap().as_duration(),
            Duration::from_secs(5)
        );
        assert_eq!(
            HumanDuration::from_str("2m").unwrap().as_duration(),
            Duration::from_secs(120)
        );
        assert_eq!(
            HumanDuration::from_str("750us").unwrap().as_duration(),
            Duration::from_micros(750)
        );
    }

    #[test]
    fn test_human_duration_rejects_garbage() {
        assert!(HumanDuration::from_str("10").is_err());
        assert!(HumanDuration::from_str("ms").is_err());
        assert!(HumanDuration::from_str("3weeks").is_err());
    }

    #[test]
    fn test_human_duration_display() {
        assert_eq!(HumanDuration::from_millis(10).to_string(), "10ms");
        assert_eq!(HumanDuration::from_millis(3000).to_string(), "3s");
        assert_eq!(HumanDuration::from_millis(1500).to_string(), "1500ms");
        assert_eq!(HumanDuration(Duration::from_micros(5)).to_string(), "5us");
    }

    #[test]
    fn test_worker_population() {
        let mut config = StressConfig::default();
        config.general.num_threads = 3;
        config.general.group_size = 4;
        assert_eq!(config.worker_population(), 12);
        assert!(!config.is_transactional());
    }
}
