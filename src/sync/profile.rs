//! Profile page: profile fields plus post and follow counters

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{SyncSource, SyncUnit, Upload};
use crate::models::{Profile, ProfileOverview, UpdateProfileInput};
use crate::realtime::{ChangeFilter, Collection, Predicate};
use crate::services::{Backend, ServiceError};
use crate::storage::{object_key, AVATARS_BUCKET};
use crate::toast::Toast;

pub type ProfileUnit = SyncUnit<ProfileSource>;

pub struct ProfileSource {
    backend: Arc<Backend>,
    profile_id: Uuid,
    viewer: Uuid,
}

impl ProfileSource {
    pub fn new(backend: Arc<Backend>, profile_id: Uuid, viewer: Uuid) -> Self {
        Self {
            backend,
            profile_id,
            viewer,
        }
    }

    pub fn profile_id(&self) -> Uuid {
        self.profile_id
    }

    fn ensure_own(&self) -> Result<(), ServiceError> {
        if self.profile_id == self.viewer {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Profiles can only be edited by their owner".to_string(),
            ))
        }
    }
}

#[async_trait]
impl SyncSource for ProfileSource {
    type Snapshot = Option<ProfileOverview>;

    fn label(&self) -> &'static str {
        "profile"
    }

    fn channel_name(&self) -> String {
        format!("profile:{}", self.profile_id)
    }

    fn filters(&self) -> Vec<ChangeFilter> {
        let id = self.profile_id;
        vec![
            ChangeFilter::new(Collection::Profiles, Predicate::eq_id("id", id)),
            ChangeFilter::new(Collection::Posts, Predicate::eq_id("author_id", id)),
            ChangeFilter::new(
                Collection::Follows,
                Predicate::eq_id("follower_id", id).or(Predicate::eq_id("following_id", id)),
            ),
        ]
    }

    async fn fetch(
        &self,
        _current: &Option<ProfileOverview>,
    ) -> Result<Option<ProfileOverview>, ServiceError> {
        let overview = self
            .backend
            .profiles
            .overview(self.profile_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Profile {}", self.profile_id)))?;
        Ok(Some(overview))
    }
}

impl SyncUnit<ProfileSource> {
    /// Edit username and bio of the viewer's own profile
    pub async fn update(&self, username: Option<&str>, bio: Option<&str>) -> Option<Profile> {
        let input = UpdateProfileInput {
            username: username.map(|u| u.trim().to_string()),
            bio: bio.map(str::to_string),
            avatar_ref: None,
        };

        let source = self.source();
        let editor = self.caller(source.viewer)?;
        let result = match source.ensure_own() {
            Ok(()) => {
                self.backend()
                    .profiles
                    .update(editor, source.profile_id, input)
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(profile) => Some(profile),
            Err(err) => {
                self.report("Error updating profile", &err);
                None
            }
        }
    }

    /// Store a new avatar and point the profile at it
    ///
    /// Returns the public URL of the uploaded image. The previous avatar is
    /// deleted once the profile points at the new one; the new image is
    /// deleted again if the profile could not be updated.
    pub async fn upload_avatar(&self, upload: Upload) -> Option<String> {
        let editor = self.caller(self.source().viewer)?;
        match self.replace_avatar(editor, upload).await {
            Ok(url) => {
                self.toaster()
                    .push(Toast::new("Success").with_description("Avatar updated successfully"));
                Some(url)
            }
            Err(err) => {
                self.report("Error uploading avatar", &err);
                None
            }
        }
    }

    async fn replace_avatar(&self, editor: Uuid, upload: Upload) -> Result<String, ServiceError> {
        let source = self.source();
        source.ensure_own()?;

        let backend = self.backend();
        let previous = backend
            .profiles
            .get(source.profile_id)
            .await?
            .and_then(|profile| profile.avatar_ref);

        let key = object_key(&upload.file_name, &upload.content_type);
        backend
            .storage
            .upload(AVATARS_BUCKET, &key, &upload.data, &upload.content_type)
            .await?;

        let input = UpdateProfileInput {
            avatar_ref: Some(key.clone()),
            ..Default::default()
        };
        if let Err(err) = backend.profiles.update(editor, source.profile_id, input).await {
            self.discard_avatar(&key).await;
            return Err(err);
        }
        info!("Avatar of {} replaced with {}", source.profile_id, key);

        if let Some(old) = previous.filter(|old| *old != key) {
            self.discard_avatar(&old).await;
        }

        Ok(backend.storage.public_url(AVATARS_BUCKET, &key))
    }

    async fn discard_avatar(&self, key: &str) {
        if let Err(err) = self.backend().storage.remove(AVATARS_BUCKET, key).await {
            warn!("Failed to remove avatar {}: {}", key, err);
        }
    }

    /// Public URL of the current avatar, if one is set
    pub fn avatar_url(&self) -> Option<String> {
        let overview = self.snapshot()?;
        let key = overview.profile.avatar_ref?;
        Some(self.backend().storage.public_url(AVATARS_BUCKET, &key))
    }
}
