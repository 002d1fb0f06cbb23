//! Object storage: avatar uploads and public URL construction.

use crate::client::Gateway;
use crate::error::Result;

impl Gateway {
    /// Upload an object with upsert semantics: re-uploading the same path
    /// replaces the previous object.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/storage/v1/object/{bucket}/{path}",
            self.config.base_url
        );
        let resp = self
            .authorize(self.http.post(url))
            .header("x-upsert", "true")
            .header("cache-control", "3600")
            .header("content-type", content_type.to_string())
            .body(bytes)
            .send()
            .await?;
        self.expect_ok(resp).await?;

        tracing::info!(bucket, path, "object uploaded");
        Ok(())
    }

    /// Public URL of a stored object. Pure string construction; the
    /// bucket must be marked public on the backend.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{path}",
            self.config.base_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[tokio::test]
    async fn upload_sets_upsert_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/storage/v1/object/user_avatars/u1/avatar.png")
            .match_header("x-upsert", "true")
            .match_header("content-type", "image/png")
            .with_status(200)
            .with_body(r#"{"Key":"user_avatars/u1/avatar.png"}"#)
            .create_async()
            .await;

        let gateway = Gateway::new(GatewayConfig {
            base_url: server.url(),
            ..GatewayConfig::default()
        })
        .unwrap();

        gateway
            .upload("user_avatars", "u1/avatar.png", vec![0x89, 0x50], "image/png")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn public_url_shape() {
        let gateway = Gateway::new(GatewayConfig {
            base_url: "https://hub.example.com".into(),
            ..GatewayConfig::default()
        })
        .unwrap();
        assert_eq!(
            gateway.public_url("user_avatars", "u1/avatar.png"),
            "https://hub.example.com/storage/v1/object/public/user_avatars/u1/avatar.png"
        );
    }
}
