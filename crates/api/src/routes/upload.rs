use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

/// Presigned URLs stay valid for 15 minutes.
const PRESIGN_TTL_SECS: u64 = 15 * 60;

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    pub kind: UploadKind,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Post,
    Avatar,
    Logo,
}

#[derive(Debug, Serialize)]
pub struct PresignResponse {
    pub upload_url: String,
    pub asset_url: String,
}

#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub bucket: String,
    pub path: String,
}

/// Hands the browser a presigned PUT for a fresh object key, plus the
/// API URL the uploaded asset will be served from.
pub async fn presign_upload(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<PresignRequest>,
) -> Result<Json<PresignResponse>, ApiError> {
    let filename = sanitize_filename(&body.filename);
    if filename.is_empty() {
        return Err(ApiError::BadRequest("A filename is required".to_string()));
    }

    let bucket = match body.kind {
        UploadKind::Post => &state.settings.storage.bucket_posts,
        UploadKind::Avatar => &state.settings.storage.bucket_avatars,
        UploadKind::Logo => &state.settings.storage.bucket_logos,
    };
    let key = format!("{}/{}-{}", auth.user_id.to_hex(), nanoid!(10), filename);

    let upload_url = state.storage.presign_put(bucket, &key, PRESIGN_TTL_SECS);
    let asset_url = format!(
        "{}/api/file?bucket={}&path={}",
        state.settings.app.base_url,
        urlencoding::encode(bucket),
        urlencoding::encode(&key),
    );

    Ok(Json(PresignResponse {
        upload_url,
        asset_url,
    }))
}

/// Redirects to a short-lived presigned GET for the stored object.
pub async fn serve_file(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<FileParams>,
) -> Result<Redirect, ApiError> {
    if !is_known_bucket(&state, &params.bucket) {
        return Err(ApiError::BadRequest("Unknown bucket".to_string()));
    }

    let url = state
        .storage
        .presign_get(&params.bucket, &params.path, PRESIGN_TTL_SECS);
    Ok(Redirect::temporary(&url))
}

fn is_known_bucket(state: &AppState, bucket: &str) -> bool {
    let storage = &state.settings.storage;
    bucket == storage.bucket_posts || bucket == storage.bucket_avatars || bucket == storage.bucket_logos
}

/// Keeps the filename filesystem- and URL-friendly.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}
