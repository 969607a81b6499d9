//! Decoding of daemon envelopes the correlator cares about.
//!
//! Every daemon line is a JSON object `{"type": <string>, "data": <any>}`.
//! Only acknowledgements and status reports are interpreted; anything else,
//! including lines that are not JSON, decodes to [`Envelope::Other`]. An
//! acknowledgement always decodes, so a daemon that omits its error code
//! still ends the exchange with a failure.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Code reported for an acknowledgement whose `err` is missing or not an
/// integer.
const MALFORMED_ACK_CODE: i64 = -1;

#[derive(Debug, Deserialize)]
struct StatusData {
    #[serde(default)]
    sid: i64,
    #[serde(default)]
    qual: i64,
    #[serde(default)]
    frame: Option<Value>,
}

/// Acknowledgement of a submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ack {
    pub(crate) code: i64,
    pub(crate) session: i64,
}

impl Ack {
    fn from_data(data: &Value) -> Self {
        let field = |name: &str| data.get(name).and_then(Value::as_i64);
        Self {
            code: field("err").unwrap_or(MALFORMED_ACK_CODE),
            session: field("sid").unwrap_or(0),
        }
    }
}

/// Asynchronous status report for an acknowledged session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Status {
    pub(crate) session: i64,
    pub(crate) qualifier: i64,
    /// `None` when the payload is absent or not a string.
    pub(crate) payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Envelope {
    Ack(Ack),
    Status(Status),
    Other,
}

impl Envelope {
    pub(crate) fn decode(line: &[u8]) -> Self {
        let Ok(raw) = serde_json::from_slice::<RawEnvelope>(line) else {
            return Self::Other;
        };
        match raw.kind.as_str() {
            "ack" => Self::Ack(Ack::from_data(&raw.data)),
            "rxstat" | "status" => StatusData::deserialize(raw.data).map_or(Self::Other, |data| {
                Self::Status(Status {
                    session: data.sid,
                    qualifier: data.qual,
                    payload: match data.frame {
                        Some(Value::String(frame)) => Some(frame),
                        _ => None,
                    },
                })
            }),
            _ => Self::Other,
        }
    }
}
