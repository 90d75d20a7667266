use axum::extract::State;
use axum::Json;

use crate::models::ModelsResponse;
use crate::state::AppState;

/// GET /api/models — models available for the UI selector, resolved once
/// at startup.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        provider: state.provider.provider.clone(),
        models: state.provider.models.clone(),
        default_model: state.provider.model.clone(),
    })
}
