use std::collections::HashSet;

use crate::domain::entity::catalog_schema::{normalize_header, CatalogSchema};

/// FileValidationError はアップロードされた CSV が受け付けられない理由。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileValidationError {
    #[error("file is empty")]
    Empty,

    #[error("file size {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("header row could not be parsed: {0}")]
    UnreadableHeader(String),

    #[error("header column {0} is blank")]
    BlankColumn(usize),

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("missing required columns: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),

    #[error("unknown columns: {}", .0.join(", "))]
    UnknownColumns(Vec<String>),

    #[error("file has no data rows")]
    NoDataRows,

    #[error("file has more than {limit} data rows")]
    TooManyRows { limit: i64 },
}

/// FileLimits はアップロード時のサイズと行数の上限。
#[derive(Debug, Clone, Copy)]
pub struct FileLimits {
    pub max_bytes: usize,
    pub max_rows: i64,
}

/// CsvInspection はヘッダー検証後のファイル概要。
#[derive(Debug, Clone, PartialEq)]
pub struct CsvInspection {
    pub headers: Vec<String>,
    pub total_rows: i64,
}

pub struct CsvFileInspector;

impl CsvFileInspector {
    /// ランナーと同じ設定の CSV リーダーを返す。行数の数え方を一致させるため両者で共有する。
    pub fn reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::None)
            .from_reader(bytes)
    }

    /// ヘッダー行を読み取り正規化する。
    pub fn headers(reader: &mut csv::Reader<&[u8]>) -> Result<Vec<String>, csv::Error> {
        Ok(reader.headers()?.iter().map(normalize_header).collect())
    }

    /// ファイルを検証し、データ行数を数える。不正な形式のデータ行は実行時に行エラーとなるため、ここでは数えるだけ。
    pub fn inspect(
        bytes: &[u8],
        schema: &CatalogSchema,
        limits: FileLimits,
    ) -> Result<CsvInspection, FileValidationError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(FileValidationError::Empty);
        }
        if bytes.len() > limits.max_bytes {
            return Err(FileValidationError::TooLarge {
                size: bytes.len(),
                limit: limits.max_bytes,
            });
        }

        let mut reader = Self::reader(bytes);
        let headers = Self::headers(&mut reader)
            .map_err(|e| FileValidationError::UnreadableHeader(e.to_string()))?;
        Self::check_headers(&headers, schema)?;

        let mut total_rows: i64 = 0;
        for _ in reader.records() {
            total_rows += 1;
            if total_rows > limits.max_rows {
                return Err(FileValidationError::TooManyRows {
                    limit: limits.max_rows,
                });
            }
        }
        if total_rows == 0 {
            return Err(FileValidationError::NoDataRows);
        }

        Ok(CsvInspection {
            headers,
            total_rows,
        })
    }

    /// 正規化済みヘッダーをスキーマと照合する。
    pub fn check_headers(
        headers: &[String],
        schema: &CatalogSchema,
    ) -> Result<(), FileValidationError> {
        let mut seen = HashSet::new();
        for (index, header) in headers.iter().enumerate() {
            if header.is_empty() {
                return Err(FileValidationError::BlankColumn(index + 1));
            }
            if !seen.insert(header.as_str()) {
                return Err(FileValidationError::DuplicateColumn(header.clone()));
            }
        }

        let unknown: Vec<String> = headers
            .iter()
            .filter(|h| schema.column(h).is_none() && !schema.is_deprecated(h))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(FileValidationError::UnknownColumns(unknown));
        }

        let missing: Vec<String> = schema
            .required_columns()
            .into_iter()
            .filter(|c| !seen.contains(c.as_str()))
            .collect();
        if !missing.is_empty() {
            return Err(FileValidationError::MissingRequiredColumns(missing));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: FileLimits = FileLimits {
        max_bytes: 1024,
        max_rows: 3,
    };

    #[test]
    fn test_inspect_counts_data_rows() {
        let csv = b"SKU*,Name*,Price*\nA-1,Shirt,10\nA-2,Hat,5.5\n";
        let result = CsvFileInspector::inspect(csv, &CatalogSchema::core_only(), LIMITS).unwrap();
        assert_eq!(result.headers, vec!["sku", "name", "price"]);
        assert_eq!(result.total_rows, 2);
    }

    #[test]
    fn test_inspect_counts_malformed_rows() {
        let csv = b"sku,name,price\nA-1,Shirt\nA-2,Hat,5\n";
        let result = CsvFileInspector::inspect(csv, &CatalogSchema::core_only(), LIMITS).unwrap();
        assert_eq!(result.total_rows, 2);
    }

    #[test]
    fn test_inspect_rejects_empty() {
        assert_eq!(
            CsvFileInspector::inspect(b"  \n", &CatalogSchema::core_only(), LIMITS),
            Err(FileValidationError::Empty)
        );
    }

    #[test]
    fn test_inspect_rejects_too_large() {
        let limits = FileLimits {
            max_bytes: 10,
            max_rows: 3,
        };
        let err =
            CsvFileInspector::inspect(b"sku,name,price\n", &CatalogSchema::core_only(), limits)
                .unwrap_err();
        assert!(matches!(err, FileValidationError::TooLarge { limit: 10, .. }));
    }

    #[test]
    fn test_inspect_rejects_header_only() {
        assert_eq!(
            CsvFileInspector::inspect(b"sku,name,price\n", &CatalogSchema::core_only(), LIMITS),
            Err(FileValidationError::NoDataRows)
        );
    }

    #[test]
    fn test_inspect_rejects_too_many_rows() {
        let csv = b"sku,name,price\na,b,1\nc,d,2\ne,f,3\ng,h,4\n";
        assert_eq!(
            CsvFileInspector::inspect(csv, &CatalogSchema::core_only(), LIMITS),
            Err(FileValidationError::TooManyRows { limit: 3 })
        );
    }

    #[test]
    fn test_check_headers_missing_required() {
        let headers = vec!["sku".to_string(), "description".to_string()];
        assert_eq!(
            CsvFileInspector::check_headers(&headers, &CatalogSchema::core_only()),
            Err(FileValidationError::MissingRequiredColumns(vec![
                "name".to_string(),
                "price".to_string()
            ]))
        );
    }

    #[test]
    fn test_check_headers_unknown_and_duplicate() {
        let schema = CatalogSchema::core_only();
        let unknown = vec![
            "sku".to_string(),
            "name".to_string(),
            "price".to_string(),
            "colour".to_string(),
        ];
        assert_eq!(
            CsvFileInspector::check_headers(&unknown, &schema),
            Err(FileValidationError::UnknownColumns(vec!["colour".to_string()]))
        );

        let duplicate = vec!["sku".to_string(), "sku".to_string()];
        assert_eq!(
            CsvFileInspector::check_headers(&duplicate, &schema),
            Err(FileValidationError::DuplicateColumn("sku".to_string()))
        );
    }

    #[test]
    fn test_check_headers_accepts_deprecated_column() {
        let mut schema = CatalogSchema::core_only();
        schema.deprecated_columns.push("legacy_code".to_string());
        let headers = vec![
            "sku".to_string(),
            "name".to_string(),
            "price".to_string(),
            "legacy_code".to_string(),
        ];
        assert!(CsvFileInspector::check_headers(&headers, &schema).is_ok());
    }
}
