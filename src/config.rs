//! Engine configuration loading, including the supported player counts and team split table.

use std::{collections::BTreeMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::roster::ParticipantId;

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/popcorn.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POPCORN_ENGINE_CONFIG_PATH";
/// Length of a day when the configuration does not say otherwise.
pub const DEFAULT_DAY_LENGTH: Duration = Duration::from_secs(10 * 60);
/// Longest day the engine accepts.
pub const MAX_DAY_LENGTH: Duration = Duration::from_secs(24 * 60 * 60);
/// How long before the deadline the gun-bearer gets reminded.
pub const DEFAULT_REMINDER_LEAD: Duration = Duration::from_secs(60);
/// Player count -> wolf count pairs shipped with the binary.
const DEFAULT_TEAM_SIZES: [(usize, usize); 6] = [(3, 1), (6, 2), (8, 3), (9, 3), (10, 4), (11, 4)];

/// Errors raised while validating a team size table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The table does not list a single player count.
    #[error("team size table is empty")]
    EmptyTable,
    /// The same player count appears twice.
    #[error("player count {0} is listed more than once")]
    DuplicatePlayerCount(usize),
    /// The minority would not be strictly smaller than the majority, or would be empty.
    #[error("{minority} wolves out of {players} players is not a playable split")]
    UnplayableSplit {
        /// Total number of players.
        players: usize,
        /// Requested size of the minority allegiance.
        minority: usize,
    },
    /// Days must last at least a second and at most [`MAX_DAY_LENGTH`].
    #[error("a day of {secs}s is not allowed (1 to {max}s)", max = MAX_DAY_LENGTH.as_secs())]
    InvalidDayLength {
        /// Requested length in seconds.
        secs: u64,
    },
}

/// Maps every supported player count to the size of the minority allegiance.
///
/// The majority gets the remaining players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSizeTable {
    minority_by_count: BTreeMap<usize, usize>,
}

impl TeamSizeTable {
    /// Build a table from `(players, minority)` pairs, rejecting unplayable or duplicate rows.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, ConfigError> {
        let mut minority_by_count = BTreeMap::new();
        for (players, minority) in entries {
            if minority == 0 || minority * 2 >= players {
                return Err(ConfigError::UnplayableSplit { players, minority });
            }
            if minority_by_count.insert(players, minority).is_some() {
                return Err(ConfigError::DuplicatePlayerCount(players));
            }
        }

        if minority_by_count.is_empty() {
            return Err(ConfigError::EmptyTable);
        }

        Ok(Self { minority_by_count })
    }

    /// Size of the minority allegiance for `players`, if that count is supported.
    pub fn minority_size(&self, players: usize) -> Option<usize> {
        self.minority_by_count.get(&players).copied()
    }

    /// Every supported player count, ascending.
    pub fn supported_counts(&self) -> Vec<usize> {
        self.minority_by_count.keys().copied().collect()
    }

    /// Human readable list of the supported counts, e.g. `3, 6 or 8`.
    pub fn describe(&self) -> String {
        let counts = self
            .supported_counts()
            .into_iter()
            .map(|count| count.to_string())
            .collect::<Vec<_>>();
        match counts.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} or {last}", rest.join(", ")),
            Some((last, _)) => last.clone(),
            None => String::new(),
        }
    }
}

impl Default for TeamSizeTable {
    fn default() -> Self {
        Self {
            minority_by_count: DEFAULT_TEAM_SIZES.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration consumed by every game engine.
pub struct EngineConfig {
    day_length: Duration,
    reminder_lead: Duration,
    host_id: ParticipantId,
    team_sizes: TeamSizeTable,
}

impl EngineConfig {
    /// Build a configuration with the given day length and table, using defaults for the rest.
    pub fn new(day_length: Duration, team_sizes: TeamSizeTable) -> Result<Self, ConfigError> {
        Ok(Self {
            day_length: validate_day_length(day_length)?,
            team_sizes,
            ..Self::default()
        })
    }

    /// Override how long before the deadline the reminder fires. Zero disables it.
    pub fn with_reminder_lead(mut self, lead: Duration) -> Self {
        self.reminder_lead = lead;
        self
    }

    /// Override the user id the engine itself acts under.
    pub fn with_host_id(mut self, host_id: ParticipantId) -> Self {
        self.host_id = host_id;
        self
    }

    /// Load the engine configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => match Self::try_from(raw) {
                    Ok(config) => {
                        info!(
                            path = %path.display(),
                            day_length_secs = config.day_length.as_secs(),
                            supported = %config.team_sizes.describe(),
                            "loaded engine config"
                        );
                        config
                    }
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "invalid config values; falling back to defaults"
                        );
                        Self::default()
                    }
                },
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Fixed length of every day.
    pub fn day_length(&self) -> Duration {
        self.day_length
    }

    /// Lead time of the "one minute left" reminder.
    pub fn reminder_lead(&self) -> Duration {
        self.reminder_lead
    }

    /// User id of the engine itself; it can never be targeted.
    pub fn host_id(&self) -> ParticipantId {
        self.host_id
    }

    /// Supported player counts and their team split.
    pub fn team_sizes(&self) -> &TeamSizeTable {
        &self.team_sizes
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            day_length: DEFAULT_DAY_LENGTH,
            reminder_lead: DEFAULT_REMINDER_LEAD,
            host_id: ParticipantId(0),
            team_sizes: TeamSizeTable::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    day_length_secs: Option<u64>,
    reminder_lead_secs: Option<u64>,
    host_id: Option<u64>,
    team_sizes: Option<Vec<RawTeamSize>>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of one row of the team size table.
struct RawTeamSize {
    players: usize,
    minority: usize,
}

impl TryFrom<RawConfig> for EngineConfig {
    type Error = ConfigError;

    fn try_from(value: RawConfig) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let team_sizes = match value.team_sizes {
            Some(rows) => {
                TeamSizeTable::from_entries(rows.into_iter().map(|row| (row.players, row.minority)))?
            }
            None => defaults.team_sizes,
        };
        let day_length = value
            .day_length_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.day_length);

        Ok(Self::new(day_length, team_sizes)?
            .with_reminder_lead(
                value
                    .reminder_lead_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.reminder_lead),
            )
            .with_host_id(value.host_id.map(ParticipantId).unwrap_or(defaults.host_id)))
    }
}

fn validate_day_length(length: Duration) -> Result<Duration, ConfigError> {
    if length.is_zero() || length > MAX_DAY_LENGTH {
        return Err(ConfigError::InvalidDayLength {
            secs: length.as_secs(),
        });
    }
    Ok(length)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
