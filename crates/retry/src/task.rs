use serde::{Deserialize, Serialize};

/// Logical category of retryable work (e.g. `ONBOARDING`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub const ONBOARDING: &'static str = "ONBOARDING";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn onboarding() -> Self {
        Self::new(Self::ONBOARDING)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TaskType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
