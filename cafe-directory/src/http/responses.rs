use axum::extract::{FromRequestParts, Path};
use axum::http::header::LOCATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::Cafe;
use crate::views::ViewContext;

use super::error::ApiError;
use super::state::AppState;

pub const LISTING_PATH: &str = "/all";

pub const NO_CAFES: &str = "Sorry, there are no cafes in the database.";
pub const NO_CAFE_AT_LOCATION: &str = "Sorry no cafe at that location.";
pub const UNKNOWN_CAFE_ID: &str = "Sorry, a cafe with that id was not found in the database.";
pub const PRICE_UPDATED: &str = "Successfully updated the price.";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cafes: i64,
}

#[derive(Debug, Serialize)]
pub struct RandomCafeResponse {
    pub cafe: Cafe,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub loc: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub new_price: Option<String>,
}

/// Integer cafe id from the `{id}` path segment. Anything else is a JSON
/// not-found, like an id that matches no row.
#[derive(Debug, Clone, Copy)]
pub struct CafeId(pub i64);

impl<S> FromRequestParts<S> for CafeId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<i64>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(CafeId(id)),
            Err(rejection) => {
                debug!(%rejection, path = %parts.uri.path(), "cafe id rejected");
                Err(ApiError::not_found(UNKNOWN_CAFE_ID))
            }
        }
    }
}

/// `302 Found`, the status browsers follow with a plain GET.
pub fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

pub fn to_listing() -> Response {
    found(LISTING_PATH)
}

pub fn render_page(
    state: &AppState,
    template: &'static str,
    context: &ViewContext,
) -> Result<Response, ApiError> {
    let html = state.renderer.render(template, context)?;
    Ok(Html(html).into_response())
}
