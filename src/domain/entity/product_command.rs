use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// AttributeValue は正規化済みの属性値。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Options(Vec<String>),
}

/// CreateProductCommand は行バリデーションを通過した商品作成ペイロード。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProductCommand {
    pub catalog_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    /// 最小通貨単位（例: セント）での価格。
    pub price_minor: i64,
    pub stock: Option<i64>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// AppliedProduct は商品作成 API の応答。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedProduct {
    #[serde(default, alias = "id")]
    pub product_id: Option<String>,
}
