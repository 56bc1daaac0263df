//! Tractography upload API.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::warn;

use crate::dmri::bundle::{BundleError, BundleUpload};
use crate::dmri::nifti::NiftiError;
use crate::error::ApiError;
use crate::services::tract::{self as tract_svc, TractError, TractOutcome};
use crate::state::AppState;

const PROCESSING_ERROR_PREFIX: &str = "An error occurred during processing: ";

/// `POST /api/tract`: multipart `dwi`, `bvecs`, `bvals`.
pub async fn analyze(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };

    match tract_svc::analyze(&state.bundles, upload, &state.config.tract).await {
        Ok(TractOutcome::Rendered(view)) => {
            let mut body = serde_json::to_value(view).unwrap_or_else(|_| json!({}));
            body["status"] = json!("ok");
            Json(body).into_response()
        }
        Ok(TractOutcome::NoStreamlines { message }) => {
            Json(json!({ "status": "warning", "message": message })).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

/// Map a typed failure to the user-facing error body.
pub(crate) fn error_response(err: &TractError) -> ApiError {
    match err {
        TractError::Bundle(BundleError::Mismatch { .. }) => ApiError::from_err(StatusCode::UNPROCESSABLE_ENTITY, err),
        TractError::Bundle(BundleError::Nifti(NiftiError::TooLarge { .. })) => {
            ApiError::from_err(StatusCode::PAYLOAD_TOO_LARGE, err)
        }
        TractError::Bundle(_) => ApiError::from_err(StatusCode::BAD_REQUEST, err),
        TractError::Pipeline(_) | TractError::Worker(_) => ApiError::from_err(StatusCode::INTERNAL_SERVER_ERROR, err)
            .with_message(format!("{PROCESSING_ERROR_PREFIX}{err}")),
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<BundleUpload, ApiError> {
    let (mut dwi, mut bvecs, mut bvals) = (None, None, None);
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_owned();
        let bytes = field.bytes().await.map_err(upload_error)?;
        match name.as_str() {
            "dwi" => dwi = Some(bytes.to_vec()),
            "bvecs" => bvecs = Some(bytes.to_vec()),
            "bvals" => bvals = Some(bytes.to_vec()),
            other => warn!(field = other, "tract: ignoring unknown upload field"),
        }
    }

    match (dwi, bvecs, bvals) {
        (Some(dwi), Some(bvecs), Some(bvals)) => Ok(BundleUpload { dwi, bvecs, bvals }),
        (dwi, bvecs, bvals) => {
            let missing: Vec<&str> = [("dwi", dwi.is_none()), ("bvecs", bvecs.is_none()), ("bvals", bvals.is_none())]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
            Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "E_MISSING_UPLOAD",
                format!("Please upload all required files to start visualization (missing: {}).", missing.join(", ")),
            ))
        }
    }
}

fn upload_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    warn!(error = %e, "tract: multipart read failed");
    ApiError::new(e.status(), "E_UPLOAD", e.body_text())
}

#[cfg(test)]
#[path = "tract_test.rs"]
mod tests;
