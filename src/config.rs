//! Session and registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filter::RecordFilter;

/// Where a new reader starts in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Oldest retained record.
    Head,
    /// Records appended after the reader opened.
    #[default]
    Tail,
}

/// How records are grouped into transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// Every record on its own.
    Raw,
    /// One transaction per vxid.
    #[default]
    Vxid,
    /// A client request with its backend requests.
    Request,
    /// Everything on one client connection.
    Session,
}

impl Grouping {
    /// Parses a grouping name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "vxid" => Ok(Self::Vxid),
            "request" => Ok(Self::Request),
            "session" => Ok(Self::Session),
            _ => Err(ConfigError::UnknownGrouping {
                name: name.to_string(),
            }),
        }
    }
}

/// Which log a session reads and how.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    /// Log endpoint (instance name); required before start.
    pub endpoint: Option<String>,
    /// Head or tail start position.
    pub mode: Mode,
    /// Transaction grouping requested from the source.
    pub grouping: Grouping,
    /// Transaction filter handed to the source.
    pub query: Option<String>,
    /// Per-record filter applied before matching.
    pub filter: RecordFilter,
    /// Incomplete-transaction timeout, forwarded to the source as is.
    pub transaction_timeout: Option<Duration>,
}

impl SourceConfig {
    /// Default configuration reading `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Sets the start position.
    #[must_use]
    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the grouping.
    #[must_use]
    pub const fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// Sets the transaction query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Replaces the record filter.
    #[must_use]
    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Caseless matching for rule patterns compiled after this point.
    #[must_use]
    pub const fn is_caseless(&self) -> bool {
        self.filter.is_caseless()
    }

    /// True if `flag` consumes a value argument.
    #[must_use]
    pub fn takes_value(flag: &str) -> bool {
        matches!(flag, "-v" | "-d" | "-g" | "-q" | "-T") || RecordFilter::takes_value(flag)
    }

    /// Applies one option as written in a test script (`-g request`, `-c`, ...).
    pub fn apply_arg(&mut self, flag: &str, value: Option<&str>) -> Result<(), ConfigError> {
        let required = || {
            value.ok_or_else(|| ConfigError::MissingArgument {
                flag: flag.to_string(),
            })
        };
        match flag {
            "-v" => self.endpoint = Some(required()?.to_string()),
            "-d" => {
                self.mode = match required()?.trim().parse::<i64>() {
                    Ok(0) => Mode::Tail,
                    Ok(_) => Mode::Head,
                    Err(_) => {
                        return Err(ConfigError::NotAnInteger {
                            token: required()?.to_string(),
                        })
                    }
                };
            }
            "-g" => self.grouping = Grouping::from_name(required()?)?,
            "-q" => self.query = Some(required()?.to_string()),
            "-T" => {
                let raw = required()?;
                let secs = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .ok_or_else(|| ConfigError::NotAnInteger {
                        token: raw.to_string(),
                    })?;
                self.transaction_timeout = Some(Duration::from_secs_f64(secs));
            }
            _ => {
                if !self.filter.apply_arg(flag, value)? {
                    return Err(ConfigError::UnknownArgument {
                        flag: flag.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Wait between dispatch attempts when no log data is available.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Maximum payload bytes quoted in failure reports.
    pub payload_excerpt_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            thread_name_prefix: "logexpect".to_string(),
            payload_excerpt_limit: 256,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
