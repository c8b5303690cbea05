pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod repository;
pub mod service;

pub use dto::*;
pub use handlers::{auth_routes, SharedAuthService};
pub use middleware::{auth_middleware, require_admin, AuthState};
pub use openapi::AuthApiDoc;
pub use repository::AuthRepository;
pub use service::AuthService;
