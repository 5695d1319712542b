//! Institute settings endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use super::dto::UpdateSettingRequest;
use super::error::ApiResult;
use super::state::AppState;
use crate::models::InstituteSetting;
use crate::settings;

pub async fn list_settings(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<InstituteSetting>>> {
    Ok(Json(settings::list(state.engine.store()).await?))
}

pub async fn get_setting(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<InstituteSetting>> {
    Ok(Json(settings::get(state.engine.store(), &name).await?))
}

/// Validated before it is stored; takes effect on the next evaluation
pub async fn update_setting(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<UpdateSettingRequest>, JsonRejection>,
) -> ApiResult<Json<InstituteSetting>> {
    let Json(req) = body?;
    let setting = settings::set(state.engine.store(), &name, &req.value_text()).await?;
    tracing::info!(
        setting = %setting.setting_name,
        value = %setting.setting_value,
        "setting updated"
    );
    Ok(Json(setting))
}
