use serde::{Deserialize, Serialize};

/// Request body for `POST /api/token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessTokenResponse {
    pub access_token: String,
}

/// Signup form (`POST /user`).
#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub email: String,
    pub password: String,
}

/// Form login (`POST /login`).
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Query of the OAuth2 redirect back from the provider.
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub nickname: Option<String>,
    pub authorities: Vec<&'static str>,
}
