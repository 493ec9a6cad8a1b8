use axum::{Json, extract::State};

use crate::application::dashboard::DashboardStats;

use super::AdminState;

pub(super) async fn dashboard_stats(State(state): State<AdminState>) -> Json<DashboardStats> {
    Json(state.dashboard.stats().await)
}
