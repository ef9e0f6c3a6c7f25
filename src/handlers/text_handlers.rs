//! Text note handlers. These are unauthenticated.

use crate::{errors::GatewayError, models::record::TextRecord, state::AppState};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SaveTextReq {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SaveTextResp {
    pub id: Uuid,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TextItem {
    pub id: Uuid,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<TextRecord> for TextItem {
    fn from(record: TextRecord) -> Self {
        Self {
            id: record.id,
            text: record.text,
            timestamp: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TextList {
    pub items: Vec<TextItem>,
}

/// `POST /save`
pub async fn save_text(
    State(state): State<AppState>,
    payload: Result<Json<SaveTextReq>, JsonRejection>,
) -> Result<Json<SaveTextResp>, GatewayError> {
    let Json(req) = payload.map_err(|e| GatewayError::bad_request(e.body_text()))?;
    let record = state.texts.save(req.text).await?;
    Ok(Json(SaveTextResp {
        id: record.id,
        message: "Text saved successfully",
    }))
}

/// `GET /items`
pub async fn list_texts(State(state): State<AppState>) -> Result<Json<TextList>, GatewayError> {
    let items = state.texts.list().await?;
    Ok(Json(TextList {
        items: items.into_iter().map(TextItem::from).collect(),
    }))
}
