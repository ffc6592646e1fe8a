use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DISPLAY_NAME: &str = "John Doe";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Local to this client; every fetch resets it.
    #[serde(skip)]
    pub is_liked: bool,
}

impl Post {
    pub fn author(&self) -> &str {
        crate::format::display_name(self.user_name.as_deref())
    }

    pub fn is_authored_by(&self, identity: &Identity) -> bool {
        self.user_name.as_deref() == Some(identity.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl Comment {
    pub fn author(&self) -> &str {
        crate::format::display_name(self.user_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub content: String,
    pub user_id: Option<String>,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewComment {
    pub post_id: String,
    pub content: String,
    pub user_id: Option<String>,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub public_url: String,
}

/// The display name this client posts, comments and deletes as. There is no
/// authentication behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    display_name: String,
}

impl Identity {
    pub fn new(display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let trimmed = display_name.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        Self {
            display_name: trimmed.to_string(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn initials(&self) -> String {
        crate::format::initials(Some(&self.display_name))
    }

    pub fn avatar_color(&self) -> &'static str {
        crate::format::avatar_color(Some(&self.display_name))
    }

    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_backend_row_and_resets_like_flag() {
        let raw = r#"{
            "id": "8a1f",
            "content": "hello wall",
            "created_at": "2024-01-05T03:07:00.123456+00:00",
            "user_id": null,
            "user_name": null,
            "likes_count": 2,
            "comments_count": 0,
            "photo_url": null,
            "is_liked": true
        }"#;
        let post: Post = serde_json::from_str(raw).unwrap();
        assert_eq!(post.author(), "Anonymous User");
        assert_eq!(post.likes_count, 2);
        assert!(!post.is_liked);
    }

    #[test]
    fn new_post_omits_missing_photo() {
        let payload = NewPost {
            content: "text".into(),
            user_id: None,
            user_name: "John Doe".into(),
            photo_url: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("photo_url").is_none());
        assert!(value["user_id"].is_null());
    }

    #[test]
    fn blank_identity_falls_back_to_default() {
        assert_eq!(Identity::new("   ").display_name(), DEFAULT_DISPLAY_NAME);
        assert_eq!(Identity::new(" Ada Lovelace ").first_name(), "Ada");
    }
}
