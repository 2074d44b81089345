#![forbid(unsafe_code)]

use poem_openapi::{ApiResponse, OpenApi};

use crate::utils::config::GreetingSettings;

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct RootApi {
    settings: GreetingSettings,
}

// ------------------- HTTP Status Codes -------------------
#[derive(ApiResponse)]
enum RootResponse {
    /// Redirect to the greeting page for the default display name.
    #[oai(status = 302)]
    Http302(#[oai(header = "Location")] String),
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl RootApi {
    #[oai(path = "/", method = "get")]
    async fn index(&self) -> RootResponse {
        // The default name is server-controlled, so no escaping is needed.
        RootResponse::Http302(format!("/hello/{}", self.settings.default_name()))
    }
}

impl RootApi {
    pub fn new(settings: GreetingSettings) -> Self {
        Self { settings }
    }
}
