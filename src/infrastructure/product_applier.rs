use std::time::Duration;

use async_trait::async_trait;

use crate::domain::entity::product_command::{AppliedProduct, CreateProductCommand};

/// ApplyError は商品作成 API 呼び出しの失敗。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// 下流サービスが行を拒否した（SKU 重複など）。再送しても結果は変わらない。
    #[error("product rejected: {0}")]
    Rejected(String),

    /// 下流サービスに到達できない、または 5xx。
    #[error("product service unavailable: {0}")]
    Unavailable(String),
}

/// ProductApplier は検証済みの行を商品として作成する外部サービスのトレイト。
/// idempotency_key は `{job_id}:{row_number}` で、同じ行の再送を下流で重複排除できる。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductApplier: Send + Sync {
    async fn apply(
        &self,
        command: &CreateProductCommand,
        idempotency_key: &str,
    ) -> Result<AppliedProduct, ApplyError>;
}

/// LoggingProductApplier は商品 API が未設定の開発環境向け実装。ログを出して成功を返す。
pub struct LoggingProductApplier;

#[async_trait]
impl ProductApplier for LoggingProductApplier {
    async fn apply(
        &self,
        command: &CreateProductCommand,
        idempotency_key: &str,
    ) -> Result<AppliedProduct, ApplyError> {
        tracing::debug!(
            sku = %command.sku,
            idempotency_key,
            "catalog api not configured, skipping product creation"
        );
        Ok(AppliedProduct::default())
    }
}

/// HttpProductApplier は商品サービスの REST API を呼び出す実装。
pub struct HttpProductApplier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductApplier {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProductApplier for HttpProductApplier {
    async fn apply(
        &self,
        command: &CreateProductCommand,
        idempotency_key: &str,
    ) -> Result<AppliedProduct, ApplyError> {
        let url = format!("{}/api/v1/products", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Idempotency-Key", idempotency_key)
            .json(command)
            .send()
            .await
            .map_err(|e| ApplyError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Ok(serde_json::from_str(&body).unwrap_or_default());
        }

        let body = resp.text().await.unwrap_or_default();
        let message = extract_error_message(&body).unwrap_or_else(|| status.to_string());
        if status.is_client_error() {
            tracing::debug!(status = %status, sku = %command.sku, "product service rejected row");
            Err(ApplyError::Rejected(message))
        } else {
            tracing::warn!(status = %status, body = %body, "product service returned an error");
            Err(ApplyError::Unavailable(format!("{status}: {message}")))
        }
    }
}

/// k1s0 の統一エラーボディ `{"error": {"message": ...}}` からメッセージを取り出す。
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn command() -> CreateProductCommand {
        CreateProductCommand {
            catalog_id: None,
            sku: "TS-1".to_string(),
            name: "T-Shirt".to_string(),
            description: None,
            price_minor: 1999,
            stock: None,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":{"code":"SYS_PRODUCT_CONFLICT","message":"sku already exists"}}"#),
            Some("sku already exists".to_string())
        );
        assert_eq!(
            extract_error_message(r#"{"message":"bad request"}"#),
            Some("bad request".to_string())
        );
        assert_eq!(extract_error_message("<html>"), None);
    }

    #[test]
    fn test_applied_product_accepts_id_alias() {
        let applied: AppliedProduct = serde_json::from_str(r#"{"id":"p-1"}"#).unwrap();
        assert_eq!(applied.product_id.as_deref(), Some("p-1"));
    }

    #[tokio::test]
    async fn test_logging_applier_succeeds() {
        let applied = LoggingProductApplier
            .apply(&command(), "job:1")
            .await
            .unwrap();
        assert!(applied.product_id.is_none());
    }

    #[tokio::test]
    async fn test_http_applier_unreachable_is_unavailable() {
        let applier =
            HttpProductApplier::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = applier.apply(&command(), "job:1").await.unwrap_err();
        assert!(matches!(err, ApplyError::Unavailable(_)));
    }
}
