use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an activity-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Authorization and ownership changes; kept indefinitely.
    Critical,
    #[default]
    Important,
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can appear in the activity log as `<entity_type>.<action>`.
pub trait Loggable: Serialize + Send + Sync {
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Grants, revocations and removals are always critical.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "removed" | "assigned" | "revoked" | "granted" | "transferred" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
