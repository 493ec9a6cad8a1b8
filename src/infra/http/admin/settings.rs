use axum::{Json, extract::State};
use serde::Deserialize;

use crate::application::admin::settings::UpdateSettingsCommand;
use crate::domain::entities::SiteSettingsRecord;

use super::super::ApiError;
use super::AdminState;

#[derive(Debug, Deserialize)]
pub(super) struct SettingsRequest {
    site_name: String,
    #[serde(default)]
    site_description: String,
    #[serde(default)]
    site_url: Option<String>,
    #[serde(default = "enabled")]
    robots_index: bool,
    #[serde(default = "enabled")]
    robots_follow: bool,
    #[serde(default = "one_day")]
    revisit_after_days: i32,
}

fn enabled() -> bool {
    true
}

fn one_day() -> i32 {
    1
}

pub(super) async fn load_settings(
    State(state): State<AdminState>,
) -> Result<Json<SiteSettingsRecord>, ApiError> {
    Ok(Json(state.settings.load().await?))
}

pub(super) async fn update_settings(
    State(state): State<AdminState>,
    Json(payload): Json<SettingsRequest>,
) -> Result<Json<SiteSettingsRecord>, ApiError> {
    let command = UpdateSettingsCommand {
        site_name: payload.site_name,
        site_description: payload.site_description,
        site_url: payload.site_url,
        robots_index: payload.robots_index,
        robots_follow: payload.robots_follow,
        revisit_after_days: payload.revisit_after_days,
    };
    Ok(Json(state.settings.update(command).await?))
}
