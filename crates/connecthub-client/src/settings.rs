//! Settings and onboarding: profile edits, avatar upload, hobby
//! selection, and the embedding refresh that keeps recommendations
//! current.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use connecthub_gateway::{Gateway, Order, QueryBuilder};
use connecthub_shared::constants::AVATAR_BUCKET;
use connecthub_shared::validate::{
    validate_avatar, validate_bio, validate_interest_selection, validate_username,
};
use connecthub_shared::{Hobby, HobbyId, Profile, ProfileUpdate, UserHobby, UserId};

use crate::error::Result;
use crate::events::EventBus;

/// Editable profile fields as bound to the settings form.
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub display_name: String,
    pub username: String,
    pub bio: String,
    pub location: String,
    pub push_notifications: bool,
}

/// A picked avatar file.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Storage path for a user's avatar: one object per user, replaced on
/// re-upload.
fn avatar_path(user: UserId, file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    format!("{user}/avatar.{ext}")
}

pub struct SettingsController {
    gateway: Arc<Gateway>,
    events: EventBus,
    /// The fixed hobby catalog for the interest picker.
    pub hobby_catalog: Vec<Hobby>,
}

impl SettingsController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            hobby_catalog: Vec::new(),
        }
    }

    pub async fn load_catalog(&mut self) -> Result<()> {
        self.hobby_catalog = self
            .gateway
            .select(
                "hobbies",
                QueryBuilder::new().select("*").order("name", Order::Asc),
            )
            .await?;
        Ok(())
    }

    /// Save the profile: optional avatar upload, field update, hobby
    /// replacement (delete-then-insert), then the embedding refresh.
    /// Validation failures block the save before anything is sent.
    pub async fn save_profile(
        &self,
        form: &ProfileForm,
        selected_hobbies: &[HobbyId],
        avatar: Option<AvatarUpload>,
    ) -> Result<Profile> {
        validate_username(&form.username)?;
        validate_bio(&form.bio)?;
        if let Some(ref avatar) = avatar {
            validate_avatar(&avatar.content_type, avatar.bytes.len())?;
        }

        let me = self.gateway.current_user_id()?;

        let mut profile_picture = None;
        if let Some(avatar) = avatar {
            let path = avatar_path(me, &avatar.file_name);
            self.gateway
                .upload(AVATAR_BUCKET, &path, avatar.bytes, &avatar.content_type)
                .await?;
            // Cache-busting timestamp: the path is stable across uploads.
            let url = self.gateway.public_url(AVATAR_BUCKET, &path);
            profile_picture = Some(format!("{url}?t={}", Utc::now().timestamp_millis()));
        }

        self.gateway
            .update(
                "profiles",
                QueryBuilder::new().eq("id", me),
                &ProfileUpdate {
                    display_name: Some(form.display_name.clone()),
                    username: Some(form.username.clone()),
                    bio: Some(form.bio.clone()),
                    location: Some(form.location.clone()),
                    profile_picture,
                    push_notifications: Some(form.push_notifications),
                },
            )
            .await?;

        self.replace_hobbies(me, selected_hobbies).await?;
        self.refresh_embedding().await;

        let profile = self
            .gateway
            .select_single("profiles", QueryBuilder::new().select("*").eq("id", me))
            .await?;
        self.events.toast_info("Profile updated");
        Ok(profile)
    }

    /// Finish onboarding: username plus a minimum interest selection.
    pub async fn complete_onboarding(
        &self,
        username: &str,
        bio: &str,
        interests: &[HobbyId],
    ) -> Result<()> {
        validate_username(username)?;
        validate_bio(bio)?;
        validate_interest_selection(interests.len())?;

        let me = self.gateway.current_user_id()?;
        self.gateway
            .update(
                "profiles",
                QueryBuilder::new().eq("id", me),
                &serde_json::json!({ "username": username, "bio": bio }),
            )
            .await?;

        self.replace_hobbies(me, interests).await?;
        self.refresh_embedding().await;
        Ok(())
    }

    async fn replace_hobbies(&self, user: UserId, hobbies: &[HobbyId]) -> Result<()> {
        self.gateway
            .delete("user_hobbies", QueryBuilder::new().eq("user_id", user))
            .await?;
        if hobbies.is_empty() {
            return Ok(());
        }
        let rows: Vec<UserHobby> = hobbies
            .iter()
            .map(|hobby_id| UserHobby {
                user_id: user,
                hobby_id: *hobby_id,
            })
            .collect();
        self.gateway.insert_only("user_hobbies", &rows).await?;
        Ok(())
    }

    /// The embedding is computed remotely from the stored hobbies. A
    /// failure leaves recommendations slightly stale, so it does not fail
    /// the save.
    async fn refresh_embedding(&self) {
        if let Err(err) = self
            .gateway
            .rpc_void("update_profile_embedding", serde_json::json!({}))
            .await
        {
            warn!(error = %err, "embedding refresh failed");
            self.events
                .toast_error("Interest matching data could not be refreshed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use connecthub_gateway::{AuthUser, GatewayConfig, Session};

    fn controller_at(
        base_url: String,
        me: UserId,
    ) -> (
        SettingsController,
        tokio::sync::mpsc::UnboundedReceiver<crate::events::UiEvent>,
    ) {
        let gateway = Gateway::new(GatewayConfig {
            base_url,
            ..GatewayConfig::default()
        })
        .unwrap();
        gateway.restore_session(Session {
            access_token: "token".into(),
            refresh_token: None,
            user: AuthUser {
                id: me,
                email: None,
            },
        });
        let (events, rx) = EventBus::new();
        (SettingsController::new(Arc::new(gateway), events), rx)
    }

    fn form() -> ProfileForm {
        ProfileForm {
            display_name: "Jane".into(),
            username: "jane".into(),
            bio: "hi".into(),
            location: "Berlin".into(),
            push_notifications: true,
        }
    }

    #[test]
    fn avatar_path_is_stable_per_user() {
        let user = UserId::new();
        assert_eq!(
            avatar_path(user, "me.PNG"),
            format!("{user}/avatar.PNG")
        );
        assert_eq!(avatar_path(user, "photo.jpeg"), format!("{user}/avatar.jpeg"));
        // No extension falls back to png.
        assert_eq!(avatar_path(user, "avatar"), format!("{user}/avatar.png"));
    }

    #[tokio::test]
    async fn invalid_username_blocks_the_save_locally() {
        let me = UserId::new();
        let (ctl, _rx) = controller_at("http://127.0.0.1:9".into(), me);
        let mut bad = form();
        bad.username = "ab".into();

        let err = ctl.save_profile(&bad, &[], None).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn onboarding_requires_three_interests() {
        let me = UserId::new();
        let (ctl, _rx) = controller_at("http://127.0.0.1:9".into(), me);
        let err = ctl
            .complete_onboarding("jane", "", &[HobbyId::new(), HobbyId::new()])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn save_runs_the_full_pipeline() {
        let mut server = mockito::Server::new_async().await;
        let me = UserId::new();

        let upload = server
            .mock(
                "POST",
                format!("/storage/v1/object/user_avatars/{me}/avatar.png").as_str(),
            )
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let update = server
            .mock("PATCH", "/rest/v1/profiles")
            .match_query(mockito::Matcher::Any)
            .with_status(204)
            .create_async()
            .await;
        let delete_hobbies = server
            .mock("DELETE", "/rest/v1/user_hobbies")
            .match_query(mockito::Matcher::Any)
            .with_status(204)
            .create_async()
            .await;
        let insert_hobbies = server
            .mock("POST", "/rest/v1/user_hobbies")
            .with_status(201)
            .create_async()
            .await;
        let embedding = server
            .mock("POST", "/rest/v1/rpc/update_profile_embedding")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(mockito::Matcher::Any)
            .with_body(format!(r#"[{{"id":"{me}","username":"jane"}}]"#))
            .create_async()
            .await;

        let (ctl, _rx) = controller_at(server.url(), me);
        let avatar = AvatarUpload {
            file_name: "portrait.png".into(),
            content_type: "image/png".into(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        };
        let profile = ctl
            .save_profile(&form(), &[HobbyId::new()], Some(avatar))
            .await
            .unwrap();

        upload.assert_async().await;
        update.assert_async().await;
        delete_hobbies.assert_async().await;
        insert_hobbies.assert_async().await;
        embedding.assert_async().await;
        assert_eq!(profile.username.as_deref(), Some("jane"));
    }
}
