use serde::{Deserialize, Serialize};
use threadline_types::{Thread, ThreadParticipant};

/// Access/refresh token pair issued by the auth endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Envelope returned by `/signin` and `/refresh`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<AuthTokens>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Result of accepting a share invite
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InviteAcceptance {
    #[serde(default)]
    pub message: Option<String>,
    pub thread: Thread,
    pub participant: ThreadParticipant,
}
