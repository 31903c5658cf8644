//! Inbound command decoding.
//!
//! Commands arrive as `{"unit": .., "value": ..}` documents. The topic
//! selects the command; `value` may be a JSON string or number.
//!
//! | Topic             | Meaning                                  |
//! |-------------------|------------------------------------------|
//! | period topic      | `value` = sampling period in minutes     |
//! | update topics (2) | `value` = host serving the new image     |

use core::fmt;

use log::warn;
use serde::Deserialize;

use crate::app::store::{HostName, MAX_HOST_LEN};
use crate::fsm::MAX_SAMPLING_PERIOD_MS;

const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Topic is not one of the subscribed command topics.
    UnknownTopic,
    /// Payload is not a `{unit, value}` document.
    Malformed,
    /// Period value is not an integer count of minutes.
    NotAnInteger,
    /// Update host is empty.
    EmptyHost,
    /// Update host exceeds the accepted length.
    HostTooLong,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTopic => write!(f, "unknown command topic"),
            Self::Malformed => write!(f, "payload is not a {{unit, value}} document"),
            Self::NotAnInteger => write!(f, "period must be an integer number of minutes"),
            Self::EmptyHost => write!(f, "update host is empty"),
            Self::HostTooLong => write!(f, "update host longer than {MAX_HOST_LEN} bytes"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Topics the channel subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTopics {
    pub period: String,
    pub update: [String; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// New sampling period, already clamped to the valid bound.
    SetPeriod { period_ms: u32 },
    /// Download and install an image from `host`.
    Update { host: HostName },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    unit: Option<String>,
    value: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Command {
    pub fn decode(topic: &str, payload: &[u8], topics: &CommandTopics) -> Result<Self, CommandError> {
        let is_period = topic == topics.period;
        let is_update = topics.update.iter().any(|t| t == topic);
        if !is_period && !is_update {
            return Err(CommandError::UnknownTopic);
        }

        let envelope: Envelope =
            serde_json::from_slice(payload).map_err(|_| CommandError::Malformed)?;

        if is_period {
            if let Some(unit) = envelope.unit.as_deref().filter(|u| *u != "min") {
                warn!("CMD | period unit {:?} ignored, value taken as minutes", unit);
            }
            let minutes = match envelope.value {
                Value::Integer(m) => m,
                Value::Text(s) => s.trim().parse::<i64>().map_err(|_| CommandError::NotAnInteger)?,
                Value::Float(_) => return Err(CommandError::NotAnInteger),
            };
            Ok(Self::SetPeriod {
                period_ms: minutes_to_period_ms(minutes),
            })
        } else {
            let host = match envelope.value {
                Value::Text(s) => s,
                _ => return Err(CommandError::Malformed),
            };
            let host = host.trim();
            if host.is_empty() {
                return Err(CommandError::EmptyHost);
            }
            let mut bounded = HostName::new();
            bounded
                .push_str(host)
                .map_err(|()| CommandError::HostTooLong)?;
            Ok(Self::Update { host: bounded })
        }
    }
}

/// Minutes to milliseconds, clamped to `[0, MAX_SAMPLING_PERIOD_MS]`.
pub fn minutes_to_period_ms(minutes: i64) -> u32 {
    let ms = minutes.saturating_mul(MS_PER_MINUTE);
    ms.clamp(0, i64::from(MAX_SAMPLING_PERIOD_MS)) as u32
}
