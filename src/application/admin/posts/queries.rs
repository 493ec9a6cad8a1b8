use crate::domain::entities::PostWithRelations;

use super::service::AdminPostService;
use super::types::AdminPostError;

impl AdminPostService {
    /// Every post, newest first. Not cached: editors expect their own writes.
    pub async fn list_posts(&self) -> Result<Vec<PostWithRelations>, AdminPostError> {
        self.reader.list_posts().await.map_err(AdminPostError::from)
    }
}
