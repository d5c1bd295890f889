use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ErrorSeverity は行エラーの深刻度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}

impl ErrorSeverity {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            _ => anyhow::bail!("invalid row error severity: {}", s),
        }
    }
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// BatchImportRowError は CSV 行（または行内のフィールド）に関する永続化されたエラー記録。
/// 追記のみで更新されない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchImportRowError {
    pub id: Uuid,
    pub job_id: Uuid,
    /// 1 始まりのデータ行番号（ヘッダーは 0 行目）。
    pub row_number: i64,
    /// None は行レベルのエラー。
    pub field: Option<String>,
    pub message: String,
    pub severity: ErrorSeverity,
    pub created_at: DateTime<Utc>,
}

impl BatchImportRowError {
    pub fn new(
        job_id: Uuid,
        row_number: i64,
        field: Option<String>,
        message: String,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            row_number,
            field,
            message,
            severity,
            created_at: Utc::now(),
        }
    }

    /// 行レベルの error を作成する。
    pub fn row_level(job_id: Uuid, row_number: i64, message: impl Into<String>) -> Self {
        Self::new(job_id, row_number, None, message.into(), ErrorSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_error_has_no_field() {
        let job_id = Uuid::new_v4();
        let err = BatchImportRowError::row_level(job_id, 4, "malformed record");
        assert_eq!(err.job_id, job_id);
        assert_eq!(err.row_number, 4);
        assert!(err.field.is_none());
        assert_eq!(err.severity, ErrorSeverity::Error);
    }

    #[test]
    fn test_severity_roundtrip() {
        for s in [ErrorSeverity::Error, ErrorSeverity::Warning, ErrorSeverity::Info] {
            assert_eq!(ErrorSeverity::from_str_value(&s.to_string()).unwrap(), s);
        }
        assert!(ErrorSeverity::from_str_value("fatal").is_err());
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&ErrorSeverity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
