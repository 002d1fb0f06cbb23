//! Remote procedure calls.
//!
//! Named server-side functions invoked with keyword arguments. The app
//! uses three: `get_weighted_recommendations`, `get_user_conversations`,
//! and `update_profile_embedding`.

use serde::de::DeserializeOwned;

use crate::client::Gateway;
use crate::error::Result;

impl Gateway {
    /// Invoke a named remote procedure and decode its result.
    pub async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        args: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/rest/v1/rpc/{function}", self.config.base_url);
        let resp = self.authorize(self.http.post(url)).json(&args).send().await?;
        let resp = self.expect_ok(resp).await?;
        Ok(resp.json().await?)
    }

    /// Invoke a procedure whose result the caller does not need.
    pub async fn rpc_void(&self, function: &str, args: serde_json::Value) -> Result<()> {
        let url = format!("{}/rest/v1/rpc/{function}", self.config.base_url);
        let resp = self.authorize(self.http.post(url)).json(&args).send().await?;
        self.expect_ok(resp).await?;
        Ok(())
    }
}
