//! HTTP message types exchanged between the manager, its clients and workers.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::crd::{JobSpec, JobStatus, MirrorType};

/// One job as rendered by `GET /jobs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorStatus {
    pub id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub help_url: String,
    #[serde(default, rename = "type")]
    pub mirror_type: MirrorType,
    #[serde(default)]
    pub size_str: String,
    #[serde(flatten)]
    pub status: JobStatus,
}

/// Response of `GET /job/<id>/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub id: String,
    #[serde(flatten)]
    pub spec: JobSpec,
}

/// Body of `POST /job/<id>/schedule`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MirrorSchedule {
    #[serde(default)]
    pub next_schedule: i64,
}

/// An action on a job or worker.
///
/// Encoded on the wire as a lowercase string. Verbs outside the known set
/// deserialize to [`CmdVerb::Unknown`], which every handler rejects with
/// 406 Not Acceptable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CmdVerb {
    #[default]
    Start,
    Stop,
    Restart,
    Ping,
    Unknown,
}

impl CmdVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmdVerb::Start => "start",
            CmdVerb::Stop => "stop",
            CmdVerb::Restart => "restart",
            CmdVerb::Ping => "ping",
            CmdVerb::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "start" => CmdVerb::Start,
            "stop" => CmdVerb::Stop,
            "restart" => CmdVerb::Restart,
            "ping" => CmdVerb::Ping,
            _ => CmdVerb::Unknown,
        }
    }
}

impl fmt::Display for CmdVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CmdVerb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CmdVerb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VerbVisitor;

        impl Visitor<'_> for VerbVisitor {
            type Value = CmdVerb;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a command verb string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<CmdVerb, E> {
                Ok(CmdVerb::from_str(v))
            }
        }

        deserializer.deserialize_str(VerbVisitor)
    }
}

/// Command message posted by clients to the manager (and forwarded to the
/// worker control endpoint).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClientCmd {
    pub cmd: CmdVerb,
    #[serde(default)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_verb_json_bijection() {
        for verb in [CmdVerb::Start, CmdVerb::Stop, CmdVerb::Restart, CmdVerb::Ping] {
            let encoded = serde_json::to_string(&verb).unwrap();
            assert_eq!(encoded, format!("\"{}\"", verb.as_str()));
            let decoded: CmdVerb = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, verb);
        }
    }

    #[test]
    fn unknown_verbs_do_not_fail_binding() {
        let cmd: ClientCmd = serde_json::from_str(r#"{"cmd": "reload"}"#).unwrap();
        assert_eq!(cmd.cmd, CmdVerb::Unknown);
        assert!(!cmd.force);
    }

    #[test]
    fn mirror_status_flattens_job_status() {
        let ms = MirrorStatus {
            id: "alpine".into(),
            size_str: "1.00G".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&ms).unwrap();
        assert_eq!(v["id"], "alpine");
        assert_eq!(v["sizeStr"], "1.00G");
        // flattened status fields sit at the top level
        assert_eq!(v["status"], "none");
        assert_eq!(v["nextSchedule"], 0);
    }

    #[test]
    fn schedule_message_field_name() {
        let s: MirrorSchedule = serde_json::from_str(r#"{"next_schedule": 1700000000}"#).unwrap();
        assert_eq!(s.next_schedule, 1_700_000_000);
    }
}
