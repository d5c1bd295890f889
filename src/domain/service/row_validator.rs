use std::collections::BTreeMap;

use crate::domain::entity::catalog_schema::{CatalogSchema, ColumnKind, ColumnSpec};
use crate::domain::entity::product_command::{AttributeValue, CreateProductCommand};
use crate::domain::entity::row_error::ErrorSeverity;
use crate::domain::value_object::cell_value::CellValue;

/// FieldIssue は 1 行の検証で見つかった問題。field が None の場合は行レベル。
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: Option<String>,
    pub message: String,
    pub severity: ErrorSeverity,
}

impl FieldIssue {
    fn error(field: &str, message: String) -> Self {
        Self {
            field: Some(field.to_string()),
            message,
            severity: ErrorSeverity::Error,
        }
    }

    fn warning(field: &str, message: String) -> Self {
        Self {
            field: Some(field.to_string()),
            message,
            severity: ErrorSeverity::Warning,
        }
    }
}

/// ValidatedRow は検証を通過した行。警告があっても成功扱い。
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub command: CreateProductCommand,
    pub warnings: Vec<FieldIssue>,
}

/// RowValidator は 1 行分のセルとカタログスキーマから商品作成コマンドを組み立てる純粋関数。
pub struct RowValidator;

impl RowValidator {
    /// `cells` は (正規化済みヘッダー, 生の値) の列順の組。
    /// 失敗時は警告を含むすべての問題を列順に返す（最初のエラーで止めない）。
    pub fn validate<'a>(
        schema: &CatalogSchema,
        cells: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<ValidatedRow, Vec<FieldIssue>> {
        let columns = schema.columns();
        let mut issues = Vec::new();
        let mut values: BTreeMap<String, CellValue> = BTreeMap::new();
        let mut present: Vec<&str> = Vec::new();

        for (header, raw) in cells {
            present.push(header);
            if schema.is_deprecated(header) {
                if !raw.trim().is_empty() {
                    issues.push(FieldIssue::warning(
                        header,
                        format!("column '{header}' is deprecated and was ignored"),
                    ));
                }
                continue;
            }
            let Some(column) = columns.iter().find(|c| c.code == header) else {
                issues.push(FieldIssue::error(header, format!("unknown column '{header}'")));
                continue;
            };
            if let Some(value) = Self::check_cell(column, raw, &mut issues) {
                values.insert(column.code.clone(), value);
            }
        }

        for column in columns.iter().filter(|c| c.required) {
            if !present.contains(&column.code.as_str()) {
                issues.push(FieldIssue::error(
                    &column.code,
                    format!("{} is required", column.code),
                ));
            }
        }

        if issues.iter().any(|i| i.severity == ErrorSeverity::Error) {
            return Err(issues);
        }

        match Self::build_command(schema, &columns, values) {
            Some(command) => Ok(ValidatedRow {
                command,
                warnings: issues,
            }),
            None => {
                issues.push(FieldIssue {
                    field: None,
                    message: "row is missing a required product field".to_string(),
                    severity: ErrorSeverity::Error,
                });
                Err(issues)
            }
        }
    }

    /// 1 セルを検証する。必須チェックに失敗した場合、そのフィールドの以降のチェックは行わない。
    fn check_cell(column: &ColumnSpec, raw: &str, issues: &mut Vec<FieldIssue>) -> Option<CellValue> {
        let field = column.code.as_str();
        let value = match CellValue::parse(raw, &column.kind) {
            Ok(value) => value,
            Err(e) => {
                issues.push(FieldIssue::error(field, e.to_string()));
                return None;
            }
        };

        if value.is_empty() {
            if column.required {
                issues.push(FieldIssue::error(field, format!("{field} is required")));
            }
            return None;
        }

        let valid = match (&column.kind, &value) {
            (ColumnKind::Text { max_len: Some(max) }, CellValue::Text(text))
                if text.chars().count() > *max =>
            {
                issues.push(FieldIssue::error(
                    field,
                    format!("{field} must be at most {max} characters"),
                ));
                false
            }
            (ColumnKind::Options { values, multi }, CellValue::MultiValue(selected)) => {
                let mut ok = true;
                if !multi && selected.len() > 1 {
                    issues.push(FieldIssue::error(
                        field,
                        format!("{field} accepts a single value but got {}", selected.len()),
                    ));
                    ok = false;
                }
                for option in selected {
                    if !values.contains(option) {
                        issues.push(FieldIssue::error(
                            field,
                            format!("unknown option '{option}' for {field}"),
                        ));
                        ok = false;
                    }
                }
                ok
            }
            _ => true,
        };
        valid.then_some(value)
    }

    fn build_command(
        schema: &CatalogSchema,
        columns: &[ColumnSpec],
        mut values: BTreeMap<String, CellValue>,
    ) -> Option<CreateProductCommand> {
        let sku = match values.remove("sku") {
            Some(CellValue::Text(s)) => s,
            _ => return None,
        };
        let name = match values.remove("name") {
            Some(CellValue::Text(s)) => s,
            _ => return None,
        };
        let price_minor = match values.remove("price") {
            Some(CellValue::Currency(p)) => p,
            _ => return None,
        };
        let description = match values.remove("description") {
            Some(CellValue::Text(s)) => Some(s),
            _ => None,
        };
        let stock = match values.remove("stock") {
            Some(CellValue::Integer(n)) => Some(n),
            _ => None,
        };

        let mut attributes = BTreeMap::new();
        for column in columns.iter().filter(|c| !c.core) {
            let attribute = match values.remove(&column.code) {
                Some(CellValue::Text(s)) => AttributeValue::Text(s),
                Some(CellValue::Number(n)) => AttributeValue::Number(n),
                Some(CellValue::MultiValue(v)) => AttributeValue::Options(v),
                _ => continue,
            };
            attributes.insert(column.code.clone(), attribute);
        }

        Some(CreateProductCommand {
            catalog_id: schema.catalog_id,
            sku,
            name,
            description,
            price_minor,
            stock,
            attributes,
        })
    }
}
