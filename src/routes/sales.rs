use std::sync::Arc;

use axum::{extract::State, Extension, Json};

use super::CurrentSession;
use crate::error::AppError;
use crate::sales::{sales_tables, NozzleSales, SalesTable};
use crate::AppState;

/// Tables for the register rows edited in this session.
pub async fn from_session(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Json<Vec<SalesTable>>, AppError> {
    let nozzles: Vec<NozzleSales> = state
        .auth
        .with_drafts(&session.token, |drafts| {
            drafts.register_rows.iter().map(NozzleSales::from).collect()
        })
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(sales_tables(&nozzles)))
}

pub async fn from_body(Json(nozzles): Json<Vec<NozzleSales>>) -> Json<Vec<SalesTable>> {
    Json(sales_tables(&nozzles))
}
