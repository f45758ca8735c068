use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conductor_core::ConductorError;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::CONFLICT, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Maps every `ConductorError` kind to the status-code table in spec.md §6:
/// 404 missing resource, 409 locked/conflicting state, 400 invalid
/// parameter or unknown driver. `NoFreeConductorWorker` gets 503 and
/// anything left over gets 500 — neither is named in that table, but both
/// are genuine server conditions the table's three codes don't fit.
impl From<ConductorError> for ApiError {
    fn from(e: ConductorError) -> Self {
        let status = match &e {
            ConductorError::NodeNotFound(_) | ConductorError::ImageNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ConductorError::NodeLocked { .. }
            | ConductorError::NodeAssociated
            | ConductorError::NodeInWrongPowerState
            | ConductorError::NodeInMaintenance
            | ConductorError::NodeMaintenanceFailure
            | ConductorError::NodeConsoleNotEnabled
            | ConductorError::NoValidHost
            | ConductorError::NoValidPortmaps
            | ConductorError::InstanceDeployFailure(_) => StatusCode::CONFLICT,
            ConductorError::InvalidParameterValue(_)
            | ConductorError::InvalidStateRequested { .. }
            | ConductorError::DriverNotFound(_)
            | ConductorError::UnsupportedDriverExtension(_)
            | ConductorError::PatchError(_)
            | ConductorError::InvalidMac(_)
            | ConductorError::ImageUnacceptable(_) => StatusCode::BAD_REQUEST,
            ConductorError::NoFreeConductorWorker => StatusCode::SERVICE_UNAVAILABLE,
            ConductorError::FailedToUpdateMacOnPort(_)
            | ConductorError::FailedToUpdateDhcpOptOnPort(_)
            | ConductorError::NetworkError(_)
            | ConductorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError { status, message: e.to_string() }
    }
}
