use std::sync::Arc;

use crate::application::admin::{
    categories::AdminCategoryService, posts::AdminPostService, settings::AdminSettingsService,
    users::AdminUserService,
};
use crate::application::{dashboard::DashboardService, indexing::IndexingService, repos::HealthRepo};
use crate::cache::InvalidationCoordinator;

#[derive(Clone)]
pub struct AdminState {
    pub health: Arc<dyn HealthRepo>,
    pub dashboard: Arc<DashboardService>,
    pub posts: Arc<AdminPostService>,
    pub categories: Arc<AdminCategoryService>,
    pub users: Arc<AdminUserService>,
    pub settings: Arc<AdminSettingsService>,
    pub indexing: Arc<IndexingService>,
    pub invalidation: InvalidationCoordinator,
}
