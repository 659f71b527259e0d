//! 非致命診斷訊息

use serde::{Deserialize, Serialize};
use std::fmt;

/// 規劃警告
///
/// `subject` 指向可追查的對象，例如 `district/site`、約束名稱或輸入檔案列號。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanWarning {
    pub subject: String,
    pub message: String,
    pub severity: WarningSeverity,
}

impl PlanWarning {
    pub fn new(subject: impl Into<String>, message: impl Into<String>, severity: WarningSeverity) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            severity,
        }
    }

    pub fn info(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, message, WarningSeverity::Info)
    }

    pub fn warning(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, message, WarningSeverity::Warning)
    }

    pub fn error(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, message, WarningSeverity::Error)
    }

    pub fn is_error(&self) -> bool {
        self.severity == WarningSeverity::Error
    }
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.subject, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for WarningSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WarningSeverity::Info => "info",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Error => "error",
        };
        f.write_str(label)
    }
}
