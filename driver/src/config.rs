//! Session configuration, loaded from TOML.
//!
//! ```toml
//! rows = 4
//! columns = 5
//! debounceThreshold = 3
//! scanIntervalMillis = 5
//! sampleTimeoutMillis = 50
//! syncPolicy = "on-change"
//! keyMapping = [
//!     ["NumLock", "KpSlash", "KpAsterisk", "KpMinus", "Esc"],
//!     ["Kp7", "Kp8", "Kp9", "KpPlus", "Bksp"],
//!     ["Kp4", "Kp5", "Kp6", "KpDot", "Tab"],
//!     ["Kp1", "Kp2", "Kp3", "Kp0", "KpEnter"],
//! ]
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use keyscan_keymap::{layouts, KeyMapping};
use serde::{Deserialize, Serialize};

use crate::debounce::DEFAULT_THRESHOLD;
use crate::error::ConfigError;
use crate::report::SyncPolicy;

/// Default cadence of scan cycles.
pub const DEFAULT_SCAN_INTERVAL_MILLIS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    pub rows: usize,
    pub columns: usize,
    /// Consecutive agreeing samples before a level is accepted, 1 to 255.
    #[serde(default = "default_threshold")]
    pub debounce_threshold: u32,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_millis: u64,
    /// Upper bound on a single sampler call. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_timeout_millis: Option<u64>,
    #[serde(default)]
    pub sync_policy: SyncPolicy,
    /// Key names, one inner list per matrix row. Only optional for a 4×5
    /// matrix, which falls back to the built-in macropad layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_mapping: Option<Vec<Vec<String>>>,
}

fn default_threshold() -> u32 {
    u32::from(DEFAULT_THRESHOLD)
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_MILLIS
}

impl Config {
    /// Defaults for everything but the matrix size.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            debounce_threshold: u32::from(DEFAULT_THRESHOLD),
            scan_interval_millis: DEFAULT_SCAN_INTERVAL_MILLIS,
            sample_timeout_millis: None,
            sync_policy: SyncPolicy::default(),
            key_mapping: None,
        }
    }

    /// Use `mapping` for this configuration, resizing the matrix to match.
    pub fn with_mapping(mut self, mapping: &KeyMapping) -> Self {
        self.rows = mapping.rows();
        self.columns = mapping.columns();
        let mut names = vec![Vec::with_capacity(mapping.columns()); mapping.rows()];
        for position in mapping.positions() {
            if let Ok(kc) = mapping.resolve(position) {
                names[position.row].push(kc.name().to_string());
            }
        }
        self.key_mapping = Some(names);
        self
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check every option and load the key mapping. Nothing is allocated for
    /// a session unless this succeeds.
    pub fn validate(&self) -> Result<KeyMapping, ConfigError> {
        let positive = [
            ("rows", self.rows as u64),
            ("columns", self.columns as u64),
            ("debounceThreshold", u64::from(self.debounce_threshold)),
            ("scanIntervalMillis", self.scan_interval_millis),
            ("sampleTimeoutMillis", self.sample_timeout_millis.unwrap_or(1)),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::NotPositive { field: *field });
        }
        if self.debounce_threshold > u32::from(u8::MAX) {
            return Err(ConfigError::TooLarge {
                field: "debounceThreshold",
                value: u64::from(self.debounce_threshold),
                max: u64::from(u8::MAX),
            });
        }

        match &self.key_mapping {
            Some(names) => Ok(KeyMapping::from_names(self.rows, self.columns, names)?),
            None if (self.rows, self.columns) == (4, 5) => Ok(layouts::macropad_4x5()),
            None => Err(ConfigError::NoMapping {
                rows: self.rows,
                columns: self.columns,
            }),
        }
    }

    /// The debounce threshold as the engine takes it. Saturates for a
    /// configuration that failed validation.
    pub fn threshold(&self) -> u8 {
        u8::try_from(self.debounce_threshold).unwrap_or(u8::MAX)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_millis)
    }

    pub fn sample_timeout(&self) -> Option<Duration> {
        self.sample_timeout_millis.map(Duration::from_millis)
    }

    /// Shortest press that is reliably reported: one full debounce window.
    pub fn min_press_duration(&self) -> Duration {
        self.scan_interval() * self.debounce_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscan_keymap::{Keycode, MappingError, Position};

    #[test]
    fn test_defaults_for_macropad() {
        let config = Config::from_toml_str("rows = 4\ncolumns = 5\n").unwrap();
        assert_eq!(config.threshold(), DEFAULT_THRESHOLD);
        assert_eq!(config.scan_interval_millis, DEFAULT_SCAN_INTERVAL_MILLIS);
        assert_eq!(config.sync_policy, SyncPolicy::OnChange);
        assert_eq!(config.sample_timeout(), None);

        let mapping = config.validate().unwrap();
        assert_eq!(mapping, layouts::macropad_4x5());
        assert_eq!(config.min_press_duration(), Duration::from_millis(15));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            rows = 2
            columns = 2
            debounceThreshold = 4
            scanIntervalMillis = 10
            sampleTimeoutMillis = 25
            syncPolicy = "per-cycle"
            keyMapping = [["Esc", "A"], ["Spc", "Enter"]]
            "#,
        )
        .unwrap();
        assert_eq!(config.sync_policy, SyncPolicy::PerCycle);
        assert_eq!(config.sample_timeout(), Some(Duration::from_millis(25)));
        assert_eq!(config.min_press_duration(), Duration::from_millis(40));

        let mapping = config.validate().unwrap();
        assert_eq!(mapping.resolve(Position::new(1, 0)), Ok(Keycode::Space));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = Config::new(4, 5);
        config.debounce_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "debounceThreshold"
            })
        ));

        let mut config = Config::new(4, 5);
        config.sample_timeout_millis = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "sampleTimeoutMillis"
            })
        ));

        assert!(matches!(
            Config::new(0, 5).validate(),
            Err(ConfigError::NotPositive { field: "rows" })
        ));
    }

    #[test]
    fn test_threshold_above_255_is_a_range_error() {
        let config = Config::from_toml_str("rows = 4\ncolumns = 5\ndebounceThreshold = 300\n")
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge {
                field: "debounceThreshold",
                value: 300,
                max: 255,
            })
        ));

        let mut config = Config::new(4, 5);
        config.debounce_threshold = 255;
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold(), 255);
    }

    #[test]
    fn test_unmapped_position_fails_fast() {
        let config = Config::from_toml_str(
            r#"
            rows = 2
            columns = 2
            keyMapping = [["A", "B"], ["C"]]
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Mapping(MappingError::Missing { .. }))
        ));

        assert!(matches!(
            Config::new(3, 3).validate(),
            Err(ConfigError::NoMapping { rows: 3, columns: 3 })
        ));
    }

    #[test]
    fn test_unknown_option_and_bad_policy_rejected() {
        assert!(matches!(
            Config::from_toml_str("rows = 4\ncolumns = 5\nscanRate = 3\n"),
            Err(ConfigError::Parse(_))
        ));
        let bad_policy = "rows = 4\ncolumns = 5\nsyncPolicy = \"always\"\n";
        assert!(Config::from_toml_str(bad_policy).is_err());
        assert!(Config::from_toml_str("rows = -4\ncolumns = 5\n").is_err());
    }

    #[test]
    fn test_with_mapping_round_trips_through_toml() {
        let mapping = KeyMapping::sequential(2, 3).unwrap();
        let config = Config::new(1, 1).with_mapping(&mapping);
        assert_eq!((config.rows, config.columns), (2, 3));

        let text = toml::to_string(&config).unwrap();
        let reloaded = Config::from_toml_str(&text).unwrap();
        assert_eq!(reloaded.validate().unwrap(), mapping);
    }
}
