use serde::{Deserialize, Serialize};

/// JWT payload shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,  // issuer
    pub iat: usize,   // issued at (unix timestamp)
    pub exp: usize,   // expires at (unix timestamp)
    pub sub: String,  // user email
    pub id: i64,      // user ID
}

/// Authenticated caller resolved from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub authorities: Vec<String>,
}
