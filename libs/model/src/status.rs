//! Status vocabulary for machines and their provider instances.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse lifecycle tag on a machine record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    Alive,
    Dying,
    Dead,
}

impl fmt::Display for Life {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Life::Alive => "alive",
            Life::Dying => "dying",
            Life::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// A status code reported for a machine or instance.
///
/// The five well-known codes are the only ones the control loops examine;
/// any other code is carried through [`Status::Other`] untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Allocating,
    Pending,
    Running,
    Started,
    Unknown,
    /// A code this crate has no opinion about; round-trips as-is.
    Other(String),
}

impl Status {
    /// The wire form of this status code.
    pub fn as_str(&self) -> &str {
        match self {
            Status::Allocating => "allocating",
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Started => "started",
            Status::Unknown => "unknown",
            Status::Other(code) => code,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Status {
    fn from(code: &str) -> Self {
        match code {
            "allocating" => Status::Allocating,
            "pending" => Status::Pending,
            "running" => Status::Running,
            "started" => Status::Started,
            "unknown" => Status::Unknown,
            other => Status::Other(other.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(code: String) -> Self {
        Status::from(code.as_str())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_string()
    }
}

/// A status code together with its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// The status code.
    pub status: Status,

    /// Free-form operator-facing message, possibly empty.
    #[serde(default)]
    pub message: String,
}

impl StatusInfo {
    /// Build a status with a message.
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build a bare status with no message.
    pub fn bare(status: Status) -> Self {
        Self::new(status, "")
    }
}

impl fmt::Display for StatusInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{} ({})", self.status, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_roundtrip() {
        for code in ["allocating", "pending", "running", "started", "unknown"] {
            let status = Status::from(code);
            assert!(!matches!(status, Status::Other(_)), "{code} should be known");
            assert_eq!(status.as_str(), code);
        }
    }

    #[test]
    fn unknown_codes_pass_through() {
        let status = Status::from("provisioning error");
        assert_eq!(status, Status::Other("provisioning error".to_string()));
        assert_eq!(status.as_str(), "provisioning error");

        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"provisioning error\"");
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn status_info_comparison_covers_message() {
        let a = StatusInfo::new(Status::Running, "booted");
        let b = StatusInfo::new(Status::Running, "rebooting");
        assert_ne!(a, b);
        assert_eq!(a, StatusInfo::new(Status::Running, "booted"));
    }

    #[test]
    fn status_info_display() {
        assert_eq!(StatusInfo::bare(Status::Pending).to_string(), "pending");
        assert_eq!(
            StatusInfo::new(Status::Running, "all good").to_string(),
            "running (all good)"
        );
    }
}
