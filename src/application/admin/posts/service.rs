use std::sync::Arc;

use crate::application::indexing::IndexingService;
use crate::application::repos::{PostsRepo, PostsWriteRepo};
use crate::cache::InvalidationCoordinator;

#[derive(Clone)]
pub struct AdminPostService {
    pub(crate) reader: Arc<dyn PostsRepo>,
    pub(crate) writer: Arc<dyn PostsWriteRepo>,
    pub(crate) invalidation: InvalidationCoordinator,
    pub(crate) indexing: IndexingService,
}

impl AdminPostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        invalidation: InvalidationCoordinator,
        indexing: IndexingService,
    ) -> Self {
        Self {
            reader,
            writer,
            invalidation,
            indexing,
        }
    }
}
