//! Profile and account models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account entity holding sign-in credentials.
///
/// The account id doubles as the profile id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Public profile of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: Option<String>,
    /// Storage key of the avatar in the `avatars` bucket
    pub avatar_ref: Option<String>,
    pub bio: Option<String>,
    pub verified: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// The subset of the profile embedded in joined records
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            username: self.username.clone(),
            avatar_ref: self.avatar_ref.clone(),
        }
    }
}

/// Author/sender information joined onto posts, comments and messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: Option<String>,
    pub avatar_ref: Option<String>,
}

impl ProfileSummary {
    /// Name shown for the profile, "Anonymous" when no username is set
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Anonymous")
    }

    /// Avatar fallback letter: the uppercased first character of the
    /// username, or '?' when there is none
    pub fn initial(&self) -> char {
        self.username
            .as_deref()
            .and_then(|name| name.chars().next())
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?')
    }
}

/// Input for updating a profile. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar_ref: Option<String>,
}

impl UpdateProfileInput {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.bio.is_none() && self.avatar_ref.is_none()
    }
}

/// Profile with its post and follow counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverview {
    pub profile: Profile,
    pub posts_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(username: Option<&str>) -> ProfileSummary {
        ProfileSummary {
            id: Uuid::new_v4(),
            username: username.map(str::to_string),
            avatar_ref: None,
        }
    }

    #[test]
    fn test_initial() {
        assert_eq!(summary(Some("alice")).initial(), 'A');
        assert_eq!(summary(Some("élodie")).initial(), 'É');
        assert_eq!(summary(Some("")).initial(), '?');
        assert_eq!(summary(None).initial(), '?');
    }

    #[test]
    fn test_display_name() {
        assert_eq!(summary(Some("bob")).display_name(), "bob");
        assert_eq!(summary(None).display_name(), "Anonymous");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let account = Account {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
