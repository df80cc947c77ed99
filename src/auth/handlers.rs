use axum::{
    extract::{Query, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            AddUserRequest, CreateAccessTokenRequest, CreateAccessTokenResponse, LoginRequest,
            OAuthCallback, PublicUser,
        },
        extractors::AuthUser,
        oauth::{new_state, AUTH_REQUEST_TTL_SECS},
    },
    cookies::{self, OAUTH2_AUTH_REQUEST_COOKIE, REFRESH_TOKEN_COOKIE},
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/token", post(create_new_access_token))
        .route("/user", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/oauth2/authorization/google", get(oauth2_authorize))
        .route("/login/oauth2/code/google", get(oauth2_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn found(location: &str, cookies: Vec<HeaderValue>) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        LOCATION,
        HeaderValue::from_str(location).map_err(anyhow::Error::from)?,
    );
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
    Ok((StatusCode::FOUND, headers).into_response())
}

#[instrument(skip(state, payload))]
pub async fn create_new_access_token(
    State(state): State<AppState>,
    Json(payload): Json<CreateAccessTokenRequest>,
) -> Result<(StatusCode, Json<CreateAccessTokenResponse>), ApiError> {
    let access_token = state
        .token_service
        .create_new_access_token(&payload.refresh_token)
        .await
        .map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            ApiError::from(e)
        })?;
    Ok((
        StatusCode::CREATED,
        Json(CreateAccessTokenResponse { access_token }),
    ))
}

#[instrument(skip(state, form))]
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<AddUserRequest>,
) -> Result<Response, ApiError> {
    state.users.save(&form.email, &form.password).await?;
    found("/login", Vec::new())
}

#[instrument(skip(state, headers, form))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginRequest>,
) -> Result<Response, ApiError> {
    let user = state.users.authenticate(&form.email, &form.password).await?;
    state
        .login_success
        .on_authentication_success(&user, &headers)
        .await
}

/// Drops the refresh-token cookie; the stored token stays until the next login.
pub async fn logout() -> Result<Response, ApiError> {
    found("/login", vec![cookies::expire(REFRESH_TOKEN_COOKIE)])
}

#[instrument(skip(state))]
pub async fn oauth2_authorize(State(state): State<AppState>) -> Result<Response, ApiError> {
    let client = state
        .oauth
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("oauth2 login is not configured".into()))?;
    let auth_state = new_state();
    let url = client.authorization_url(&auth_state)?;
    let cookie = cookies::build(OAUTH2_AUTH_REQUEST_COOKIE, &auth_state, AUTH_REQUEST_TTL_SECS)?;
    found(&url, vec![cookie])
}

#[instrument(skip(state, headers, query))]
pub async fn oauth2_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallback>,
) -> Result<Response, ApiError> {
    let client = state
        .oauth
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("oauth2 login is not configured".into()))?;

    if let Some(error) = query.error {
        warn!(%error, "oauth2 provider returned an error");
        return Err(ApiError::Unauthorized(format!("oauth2 login failed: {error}")));
    }

    let expected = cookies::read(&headers, OAUTH2_AUTH_REQUEST_COOKIE);
    match (&expected, &query.state) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => {
            warn!("oauth2 state mismatch");
            return Err(ApiError::Unauthorized("oauth2 state mismatch".into()));
        }
    }
    let code = query
        .code
        .ok_or_else(|| ApiError::BadRequest("missing authorization code".into()))?;

    let profile = client.fetch_profile(&code).await.map_err(|e| {
        warn!(error = %e, "oauth2 code exchange failed");
        ApiError::Unauthorized("oauth2 login failed".into())
    })?;
    let user = state
        .users
        .save_or_update_oauth(&profile.email, profile.name.as_deref())
        .await?;

    state
        .login_success
        .on_authentication_success(&user, &headers)
        .await
}

#[instrument(skip(state, principal))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.users.find_by_id(principal.user_id).await?;
    Ok(Json(PublicUser {
        authorities: user.authorities(),
        id: user.id,
        email: user.email,
        nickname: user.nickname,
    }))
}
