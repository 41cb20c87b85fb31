//! Session-backed entry points used by the HTTP layer: login, logout, image
//! uploads and admin log export.

use super::AppState;
use crate::auth::validate_username;
use crate::error::{ChatError, ChatResult};
use crate::storage::ImageMeta;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session: SessionId,
    pub username: String,
    pub is_admin: bool,
}

impl AppState {
    /// Log in as a regular user. Banned usernames and addresses are refused.
    pub async fn login(&self, username: &str, ip: &str) -> ChatResult<LoginResponse> {
        let username = validate_username(username)?;
        if self.is_banned(&username, ip).await {
            tracing::warn!(username = %username, ip = %ip, "Banned user tried to log in");
            return Err(ChatError::Banned);
        }

        let identity = Identity::user(username);
        let session = self.sessions.create(identity.clone()).await;
        tracing::info!(username = %identity.username, ip = %ip, "User logged in");
        Ok(LoginResponse {
            session,
            username: identity.username,
            is_admin: false,
        })
    }

    pub async fn admin_login(&self, username: &str, password: &str) -> ChatResult<LoginResponse> {
        if !self.admin_credentials.validate(username, password) {
            tracing::warn!(username = %username, "Failed admin login");
            return Err(ChatError::Unauthenticated);
        }

        let identity = Identity::admin(username);
        let session = self.sessions.create(identity.clone()).await;
        tracing::info!(username = %username, "Admin logged in");
        Ok(LoginResponse {
            session,
            username: identity.username,
            is_admin: true,
        })
    }

    pub async fn logout(&self, session_id: &str) {
        self.sessions.remove(session_id).await;
    }

    pub async fn identity(&self, session_id: &str) -> ChatResult<Identity> {
        self.sessions
            .get(session_id)
            .await
            .ok_or(ChatError::Unauthenticated)
    }

    /// Store an uploaded image and post it into a room.
    ///
    /// Only an unbanned session with a live connection inside the room may
    /// post. If the room or membership disappears while the file is being
    /// written, the stored file is removed again.
    pub async fn upload_image(
        &self,
        session_id: &str,
        ip: &str,
        room_id: &RoomId,
        bytes: &[u8],
        meta: &ImageMeta,
    ) -> ChatResult<String> {
        let identity = self.identity(session_id).await?;
        if self.is_banned(&identity.username, ip).await {
            tracing::warn!(username = %identity.username, ip = %ip, "Banned user tried to upload");
            return Err(ChatError::Banned);
        }
        self.core
            .read()
            .await
            .member_for_session(session_id, room_id)?;

        let url = self.images.store(bytes, meta).await?;

        if let Err(e) = self.post_image(session_id, room_id, &url).await {
            if let Err(remove_err) = self.images.remove(&url).await {
                tracing::warn!(url = %url, error = %remove_err, "Failed to remove orphaned upload");
            }
            return Err(e);
        }

        tracing::info!(username = %identity.username, room_id = %room_id, url = %url, "Image posted");
        Ok(url)
    }

    /// Full room log for an admin session
    pub async fn admin_room_log(
        &self,
        session_id: &str,
        room_id: &RoomId,
    ) -> ChatResult<(String, Vec<LogEntry>)> {
        let identity = self.identity(session_id).await?;
        if !identity.is_admin {
            tracing::warn!(username = %identity.username, "Non-admin requested a room log");
            return Err(ChatError::PermissionDenied);
        }
        self.room_log(room_id).await.ok_or(ChatError::RoomNotFound)
    }
}
