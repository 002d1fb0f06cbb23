//! Typed row operations: select, count, insert, update, delete.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::Gateway;
use crate::error::{GatewayError, Result};
use crate::query::QueryBuilder;

impl Gateway {
    /// Select all rows matching the query.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: QueryBuilder,
    ) -> Result<Vec<T>> {
        let resp = self
            .authorize(self.http.get(self.rest_url(table)))
            .query(&query.into_params())
            .send()
            .await?;
        let resp = self.expect_ok(resp).await?;
        Ok(resp.json().await?)
    }

    /// Select exactly one row; [`GatewayError::NotFound`] if none match.
    pub async fn select_single<T: DeserializeOwned>(
        &self,
        table: &str,
        query: QueryBuilder,
    ) -> Result<T> {
        self.select_maybe(table, query)
            .await?
            .ok_or(GatewayError::NotFound)
    }

    /// Select at most one row.
    pub async fn select_maybe<T: DeserializeOwned>(
        &self,
        table: &str,
        query: QueryBuilder,
    ) -> Result<Option<T>> {
        let mut rows: Vec<T> = self.select(table, query.limit(1)).await?;
        Ok(rows.pop())
    }

    /// Count matching rows without fetching them (HEAD + exact count).
    pub async fn count(&self, table: &str, query: QueryBuilder) -> Result<u64> {
        let resp = self
            .authorize(self.http.head(self.rest_url(table)))
            .query(&query.into_params())
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let resp = self.expect_ok(resp).await?;

        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(parse_content_range_total(range).unwrap_or(0))
    }

    /// Insert rows and return the stored representations.
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        rows: &T,
    ) -> Result<Vec<R>> {
        let resp = self
            .authorize(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        let resp = self.expect_ok(resp).await?;
        Ok(resp.json().await?)
    }

    /// Insert rows without asking for the stored representation back.
    pub async fn insert_only<T: Serialize>(&self, table: &str, rows: &T) -> Result<()> {
        let resp = self
            .authorize(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        self.expect_ok(resp).await?;
        Ok(())
    }

    /// Apply a partial update to all rows matching the query.
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: QueryBuilder,
        patch: &T,
    ) -> Result<()> {
        let resp = self
            .authorize(self.http.patch(self.rest_url(table)))
            .query(&query.into_params())
            .json(patch)
            .send()
            .await?;
        self.expect_ok(resp).await?;
        Ok(())
    }

    /// Delete all rows matching the query.
    pub async fn delete(&self, table: &str, query: QueryBuilder) -> Result<()> {
        let resp = self
            .authorize(self.http.delete(self.rest_url(table)))
            .query(&query.into_params())
            .send()
            .await?;
        self.expect_ok(resp).await?;
        Ok(())
    }
}

/// `Content-Range: 0-24/3573` -> 3573
fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: String,
        name: String,
    }

    fn gateway_for(server: &mockito::ServerGuard) -> Gateway {
        Gateway::new(GatewayConfig {
            base_url: server.url(),
            anon_key: "test-key".into(),
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn select_decodes_rows() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/hobbies")
            .match_query(mockito::Matcher::UrlEncoded("select".into(), "*".into()))
            .with_status(200)
            .with_body(r#"[{"id":"1","name":"Chess"},{"id":"2","name":"Running"}]"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let rows: Vec<Row> = gateway
            .select("hobbies", QueryBuilder::new().select("*"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Chess");
    }

    #[tokio::test]
    async fn select_single_maps_empty_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let err = gateway
            .select_single::<Row>("profiles", QueryBuilder::new().eq("id", "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound));
    }

    #[tokio::test]
    async fn api_error_carries_backend_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/connections")
            .with_status(409)
            .with_body(r#"{"message":"duplicate key value"}"#)
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let err = gateway
            .insert_only("connections", &serde_json::json!({"user1_id": "a"}))
            .await
            .unwrap_err();
        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "duplicate key value");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total(""), None);
    }
}
