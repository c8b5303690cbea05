use crate::dto::*;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CVE Intelligence Aggregator — Auth API",
        version = "1.0.0",
        description = "Registration, login, and refresh-token lifecycle for the CVE intelligence platform.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        LoginResponse,
        RefreshRequest,
        UserProfileResponse,
    )),
    tags(
        (name = "auth", description = "Registration, login, refresh, logout")
    )
)]
pub struct AuthApiDoc;
