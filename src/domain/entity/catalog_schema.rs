use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SKU_MAX_LEN: usize = 64;
pub const NAME_MAX_LEN: usize = 255;

/// AttributeKind はカタログ属性の値の型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttributeKind {
    Text,
    Number,
    Options {
        values: Vec<String>,
        #[serde(default)]
        multi: bool,
    },
}

/// AttributeDefinition はカタログ固有の属性列の定義。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub code: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: AttributeKind,
    #[serde(default)]
    pub required: bool,
}

/// ColumnKind は CSV 列を解析する際の型。コア列と属性列を同じ形で扱う。
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Text { max_len: Option<usize> },
    Integer,
    Number,
    Currency,
    Options { values: Vec<String>, multi: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub code: String,
    pub kind: ColumnKind,
    pub required: bool,
    /// コア商品列かどうか（false は属性列）。
    pub core: bool,
}

/// CatalogSchema は行バリデーションに使うカタログのスキーマ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSchema {
    #[serde(default)]
    pub catalog_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub deprecated_columns: Vec<String>,
}

pub const CORE_COLUMNS: [&str; 5] = ["sku", "name", "price", "description", "stock"];

/// ヘッダー名を正規化する（前後空白・BOM・テンプレートの必須マーカー `*` を除去し小文字化）。
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .trim_end_matches('*')
        .trim()
        .to_lowercase()
}

impl CatalogSchema {
    /// コア列のみを持つ組み込みの既定スキーマ。
    pub fn core_only() -> Self {
        Self {
            catalog_id: None,
            name: "default".to_string(),
            attributes: Vec::new(),
            deprecated_columns: Vec::new(),
        }
    }

    fn core_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec {
                code: "sku".to_string(),
                kind: ColumnKind::Text {
                    max_len: Some(SKU_MAX_LEN),
                },
                required: true,
                core: true,
            },
            ColumnSpec {
                code: "name".to_string(),
                kind: ColumnKind::Text {
                    max_len: Some(NAME_MAX_LEN),
                },
                required: true,
                core: true,
            },
            ColumnSpec {
                code: "price".to_string(),
                kind: ColumnKind::Currency,
                required: true,
                core: true,
            },
            ColumnSpec {
                code: "description".to_string(),
                kind: ColumnKind::Text { max_len: None },
                required: false,
                core: true,
            },
            ColumnSpec {
                code: "stock".to_string(),
                kind: ColumnKind::Integer,
                required: false,
                core: true,
            },
        ]
    }

    /// テンプレート順（コア列 → 属性列）の列定義を返す。
    pub fn columns(&self) -> Vec<ColumnSpec> {
        let mut columns = Self::core_columns();
        columns.extend(self.attributes.iter().map(|attr| ColumnSpec {
            code: attr.code.to_lowercase(),
            kind: match &attr.kind {
                AttributeKind::Text => ColumnKind::Text { max_len: None },
                AttributeKind::Number => ColumnKind::Number,
                AttributeKind::Options { values, multi } => ColumnKind::Options {
                    values: values.clone(),
                    multi: *multi,
                },
            },
            required: attr.required,
            core: false,
        }));
        columns
    }

    pub fn column(&self, code: &str) -> Option<ColumnSpec> {
        self.columns().into_iter().find(|c| c.code == code)
    }

    pub fn is_deprecated(&self, code: &str) -> bool {
        self.deprecated_columns
            .iter()
            .any(|d| normalize_header(d) == code)
    }

    pub fn required_columns(&self) -> Vec<String> {
        self.columns()
            .into_iter()
            .filter(|c| c.required)
            .map(|c| c.code)
            .collect()
    }

    /// CSV テンプレートのヘッダー行。必須列には `*` を付ける。
    pub fn template_header(&self) -> String {
        self.columns()
            .iter()
            .map(|c| {
                if c.required {
                    format!("{}*", c.code)
                } else {
                    c.code.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// YAML からスキーマを読み込み、整合性を検証する。
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let schema: CatalogSchema = serde_yaml::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    /// ロード時の整合性チェック。
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen: Vec<String> = CORE_COLUMNS.iter().map(ToString::to_string).collect();
        for attr in &self.attributes {
            let code = attr.code.to_lowercase();
            if code.is_empty() || code.contains(',') || code.ends_with('*') {
                anyhow::bail!("catalog {}: invalid attribute code '{}'", self.name, attr.code);
            }
            if seen.contains(&code) {
                anyhow::bail!("catalog {}: duplicate column '{}'", self.name, code);
            }
            if let AttributeKind::Options { values, .. } = &attr.kind {
                if values.is_empty() {
                    anyhow::bail!("catalog {}: attribute '{}' has no options", self.name, code);
                }
                if values.iter().any(|v| v.contains(',')) {
                    anyhow::bail!(
                        "catalog {}: option values of '{}' must not contain ','",
                        self.name,
                        code
                    );
                }
            }
            seen.push(code);
        }
        for deprecated in &self.deprecated_columns {
            if seen.contains(&normalize_header(deprecated)) {
                anyhow::bail!(
                    "catalog {}: deprecated column '{}' is also an active column",
                    self.name,
                    deprecated
                );
            }
        }
        Ok(())
    }
}
