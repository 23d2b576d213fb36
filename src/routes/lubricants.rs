use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::CurrentSession;
use crate::error::AppError;
use crate::lubricants::{LubricantPatch, LubricantView, SelectionRequest};
use crate::AppState;

pub async fn view(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Json<LubricantView>, AppError> {
    state
        .auth
        .with_drafts(&session.token, |drafts| drafts.lubricants.view())
        .map(Json)
        .ok_or(AppError::Unauthenticated)
}

/// Apply a preset and/or an explicit list of names.
pub async fn select(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<LubricantView>, AppError> {
    let result = state
        .auth
        .with_drafts(&session.token, |drafts| -> Result<LubricantView, Vec<String>> {
            let register = &mut drafts.lubricants;
            if let Some(preset) = req.preset {
                register.apply_preset(preset);
            }
            if let Some(names) = &req.names {
                register.select(names)?;
            }
            Ok(register.view())
        })
        .ok_or(AppError::Unauthenticated)?;

    result.map(Json).map_err(|unknown| {
        AppError::BadRequest(format!("Unknown lubricant(s): {}", unknown.join(", ")))
    })
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Path(name): Path<String>,
    Json(patch): Json<LubricantPatch>,
) -> Result<Json<LubricantView>, AppError> {
    let view = state
        .auth
        .with_drafts(&session.token, |drafts| {
            drafts.lubricants.update(&name, &patch)?;
            Some(drafts.lubricants.view())
        })
        .ok_or(AppError::Unauthenticated)?;

    view.map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Unknown lubricant: {name}")))
}
