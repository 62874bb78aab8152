pub mod auth;
pub mod builder;
pub mod client;
pub mod error;
mod http;
pub mod models;
pub mod tokens;
pub mod trait_client;

pub use auth::AuthClient;
pub use builder::PersistClientBuilder;
pub use client::HttpPersistClient;
pub use error::{PersistError, Result};
pub use models::{AuthResponse, AuthTokens, InviteAcceptance, SignInRequest, SignUpRequest, User};
pub use tokens::{MemoryTokenStore, TokenStore};
pub use trait_client::PersistenceClient;
