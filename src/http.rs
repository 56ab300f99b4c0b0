//! HTTP glue for axum handlers
//!
//! [`RepoError`] converts into a JSON error response, and
//! [`RequestParams`](crate::criteria::RequestParams) deserializes straight from
//! `axum::extract::Query`:
//!
//! ```rust,ignore
//! async fn list_products(
//!     State(state): State<AppState>,
//!     Query(params): Query<RequestParams>,
//! ) -> Result<Json<serde_json::Value>, RepoError> {
//!     let mut repository = state.products();
//!     let request = Arc::new(RequestCriteria::from_params(params, repository.config()));
//!     repository.push_criteria_ref(request.clone(), None);
//!     let rows = repository.all(&["*"]).await?;
//!     Ok(Json(json!({ "data": rows, "pagination": request.paginate_json() })))
//! }
//! ```

use crate::core::error::{PipelineError, RepoError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl RepoError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RepoError::NotFound { .. } => StatusCode::NOT_FOUND,
            RepoError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            RepoError::Pipeline(PipelineError::MissingInput { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RepoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}
