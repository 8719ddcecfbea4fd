use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, MethodRouter};
use axum::{Form, Json, Router};
use axum_extra::extract::cookie::SignedCookieJar;
use rand::seq::IndexedRandom;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::GlobalKeyExtractor,
    GovernorLayer,
};
use tracing::{debug, info};

use crate::auth::password_matches;
use crate::config::GuardedRoute;
use crate::forms::{CafeForm, FieldErrors, LoginForm, RegisterForm};
use crate::views::ViewContext;

use super::auth::{login, logout, require_admin, CurrentUser};
use super::error::ApiError;
use super::responses::{
    render_page, to_listing, CafeId, HealthResponse, PriceQuery, RandomCafeResponse,
    SearchQuery, SuccessResponse, NO_CAFES, NO_CAFE_AT_LOCATION, PRICE_UPDATED, UNKNOWN_CAFE_ID,
};
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    let Some(governor_conf) = GovernorConfigBuilder::default()
        .per_second(20)
        .burst_size(50)
        .key_extractor(GlobalKeyExtractor)
        .finish()
    else {
        unreachable!("constant governor settings are valid")
    };
    let governor_conf = Arc::new(governor_conf);

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/all", get(all_cafes))
        .route("/random", get(random_cafe))
        .route("/cafe/{id}", get(cafe_detail).post(cafe_detail))
        .route("/search", get(search))
        .route(
            "/add",
            guarded(&state, GuardedRoute::Add, get(add_cafe_page).post(add_cafe)),
        )
        .route(
            "/update-price/{id}",
            guarded(&state, GuardedRoute::UpdatePrice, patch(update_price)),
        )
        .route(
            "/report-closed/{id}",
            guarded(&state, GuardedRoute::ReportClosed, get(report_closed)),
        )
        .route("/signup", get(signup_page).post(signup))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout_submit))
        .layer(GovernorLayer::new(governor_conf))
        .layer(
            tower_http::request_id::SetRequestIdLayer::new(
                axum::http::header::HeaderName::from_static("x-request-id"),
                tower_http::request_id::MakeRequestUuid::default(),
            ),
        )
        .layer(tower_http::request_id::PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Attach the admin-only guard when the configuration asks for it.
fn guarded(
    state: &AppState,
    route: GuardedRoute,
    method_router: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    if state.is_admin_only(route) {
        debug!(?route, "admin-only guard attached");
        method_router.route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
    } else {
        method_router
    }
}

async fn home() -> Response {
    to_listing()
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let cafes = state.with_db(|db| db.count_cafes()).await?;
    Ok(Json(HealthResponse { status: "ok", cafes }))
}

async fn all_cafes(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    let cafes = state.with_db(|db| db.all_cafes_by_name()).await?;
    debug!(cafes = cafes.len(), "listing requested");
    let context = ViewContext::new(current.summary()).insert("index.html", "cafes", &cafes)?;
    render_page(&state, "index.html", &context)
}

async fn random_cafe(State(state): State<AppState>) -> Result<Json<RandomCafeResponse>, ApiError> {
    let cafes = state.with_db(|db| db.all_cafes()).await?;
    let cafe = cafes
        .choose(&mut rand::rng())
        .cloned()
        .ok_or_else(|| ApiError::not_found(NO_CAFES))?;
    debug!(cafe_id = cafe.id, "random cafe picked");
    Ok(Json(RandomCafeResponse { cafe }))
}

/// An unknown id still renders the page, with a null cafe.
async fn cafe_detail(
    State(state): State<AppState>,
    CafeId(id): CafeId,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    let cafe = state.with_db(move |db| db.cafe_by_id(id)).await?;
    debug!(cafe_id = id, found = cafe.is_some(), "cafe requested");
    let context = ViewContext::new(current.summary()).insert("cafe.html", "cafe", &cafe)?;
    render_page(&state, "cafe.html", &context)
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    let no_match = || ApiError::NotFound {
        status: StatusCode::OK,
        message: NO_CAFE_AT_LOCATION,
    };
    let Some(location) = query.loc else {
        return Err(no_match());
    };
    let cafes = {
        let location = location.clone();
        state
            .with_db(move |db| db.cafes_at_location(&location))
            .await?
    };
    debug!(location = %location, results = cafes.len(), "search requested");
    if cafes.is_empty() {
        return Err(no_match());
    }

    let context = ViewContext::new(current.summary())
        .insert("search.html", "location", &location)?
        .insert("search.html", "cafes", &cafes)?;
    render_page(&state, "search.html", &context)
}

fn form_page<F: serde::Serialize>(
    state: &AppState,
    template: &'static str,
    current: &CurrentUser,
    form: &F,
    errors: &FieldErrors,
) -> Result<Response, ApiError> {
    let context = ViewContext::new(current.summary())
        .insert(template, "form", form)?
        .insert(template, "errors", errors)?;
    render_page(state, template, &context)
}

async fn add_cafe_page(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    form_page(
        &state,
        "add_cafe.html",
        &current,
        &CafeForm::default(),
        &FieldErrors::default(),
    )
}

async fn add_cafe(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<CafeForm>,
) -> Result<Response, ApiError> {
    let new_cafe = match form.validate(current.id()) {
        Ok(new_cafe) => new_cafe,
        Err(errors) => {
            debug!(fields = ?errors.fields().collect::<Vec<_>>(), "cafe form rejected");
            return form_page(&state, "add_cafe.html", &current, &form, &errors);
        }
    };

    let cafe = state.with_db(move |db| db.insert_cafe(&new_cafe)).await?;
    info!(
        cafe_id = cafe.id,
        name = %cafe.name,
        author_id = ?cafe.author_id,
        "cafe added"
    );
    Ok(to_listing())
}

async fn update_price(
    State(state): State<AppState>,
    CafeId(id): CafeId,
    Query(query): Query<PriceQuery>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    let new_price = query.new_price;
    let updated = {
        let new_price = new_price.clone();
        state
            .with_db(move |db| db.update_coffee_price(id, new_price.as_deref()))
            .await?
    };
    if !updated {
        return Err(ApiError::NotFound {
            status: StatusCode::BAD_REQUEST,
            message: UNKNOWN_CAFE_ID,
        });
    }

    info!(cafe_id = id, new_price = ?new_price, "coffee price updated");
    Ok((
        StatusCode::OK,
        Json(SuccessResponse {
            success: PRICE_UPDATED,
        }),
    ))
}

async fn report_closed(
    State(state): State<AppState>,
    CafeId(id): CafeId,
) -> Result<Response, ApiError> {
    let deleted = state.with_db(move |db| db.delete_cafe(id)).await?;
    if !deleted {
        return Err(ApiError::not_found(UNKNOWN_CAFE_ID));
    }
    info!(cafe_id = id, "cafe reported closed and removed");
    Ok(to_listing())
}

async fn signup_page(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    form_page(
        &state,
        "signup.html",
        &current,
        &RegisterForm::default(),
        &FieldErrors::default(),
    )
}

async fn signup(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: SignedCookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, ApiError> {
    let new_user = match form.validate() {
        Ok(new_user) => new_user,
        Err(errors) => return form_page(&state, "signup.html", &current, &form, &errors),
    };

    let user = state.with_db(move |db| db.insert_user(&new_user)).await?;
    info!(user_id = user.id, "account registered");
    let jar = login(&state, jar, &current, &user);
    Ok((jar, to_listing()).into_response())
}

async fn login_page(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    form_page(
        &state,
        "login.html",
        &current,
        &LoginForm::default(),
        &FieldErrors::default(),
    )
}

/// A wrong password and an unknown email both re-render the form with no message.
async fn login_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let credentials = match form.validate() {
        Ok(credentials) => credentials,
        Err(errors) => return form_page(&state, "login.html", &current, &form, &errors),
    };

    let email = credentials.email.clone();
    let user = state.with_db(move |db| db.user_by_email(&email)).await?;
    match user {
        Some(user) if password_matches(&user, &credentials.password) => {
            info!(user_id = user.id, "user logged in");
            let jar = login(&state, jar, &current, &user);
            Ok((jar, to_listing()).into_response())
        }
        Some(user) => {
            debug!(user_id = user.id, "login refused: password mismatch");
            form_page(&state, "login.html", &current, &form, &FieldErrors::default())
        }
        None => {
            debug!("login refused: unknown email");
            form_page(&state, "login.html", &current, &form, &FieldErrors::default())
        }
    }
}

async fn logout_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: SignedCookieJar,
) -> Response {
    if let Some(user_id) = current.id() {
        info!(user_id, "user logged out");
    }
    let jar = logout(&state, jar, &current);
    (jar, to_listing()).into_response()
}
