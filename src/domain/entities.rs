//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub featured_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PostRecord {
    /// Timestamp used for sitemap freshness: last update, else creation.
    pub fn last_modified(&self) -> OffsetDateTime {
        self.updated_at.max(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// A post joined with its owning category and author for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostWithRelations {
    #[serde(flatten)]
    pub post: PostRecord,
    pub category: Option<CategoryRef>,
    pub author: Option<AuthorRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role_id: Option<Uuid>,
    pub role_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSettingsRecord {
    pub site_name: String,
    pub site_description: String,
    pub site_url: Option<String>,
    pub robots_index: bool,
    pub robots_follow: bool,
    pub revisit_after_days: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Default for SiteSettingsRecord {
    fn default() -> Self {
        Self {
            site_name: "Inkpost".to_string(),
            site_description: String::new(),
            site_url: None,
            robots_index: true,
            robots_follow: true,
            revisit_after_days: 1,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// Recent post summary shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
