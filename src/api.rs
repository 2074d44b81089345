#![forbid(unsafe_code)]

use poem::{Endpoint, EndpointExt, Route};
use poem_openapi::OpenApiService;

use crate::api::hello::HelloApi;
use crate::api::root::RootApi;
use crate::api::version::VersionApi;
use crate::utils::config::GreetingSettings;
use crate::utils::security::SecurityHeaders;

pub mod hello;
pub mod root;
pub mod version;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const API_TITLE: &str = "Greeting Server";

// ***************************************************************************
// GENERAL PUBLIC FUNCTIONS
// ***************************************************************************
// ---------------------------------------------------------------------------
// build_app:
// ---------------------------------------------------------------------------
/** Assemble the complete application endpoint: the greeting endpoints with
 * the given settings, the generated openapi spec at /spec and /spec_yaml,
 * the swagger ui at /docs, and the security headers stamped on every
 * response.  The settings are injected here once; request handlers never
 * consult the environment.
 */
pub fn build_app(settings: GreetingSettings, server_url: &str) -> impl Endpoint {
    let endpoints = (RootApi::new(settings), HelloApi::new(settings), VersionApi);
    let api_service =
        OpenApiService::new(endpoints, API_TITLE, env!("CARGO_PKG_VERSION")).server(server_url);

    // Allow the generated openapi specs to be retrieved from the server.
    let spec = api_service.spec_endpoint();
    let spec_yaml = api_service.spec_endpoint_yaml();
    let ui = api_service.swagger_ui();

    Route::new()
        .nest("/docs", ui)
        .at("/spec", spec)
        .at("/spec_yaml", spec_yaml)
        .nest("/", api_service)
        .with(SecurityHeaders::new())
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use poem::http::StatusCode;
    use poem::{Endpoint, Request, Response};

    use crate::api::build_app;
    use crate::utils::config::{GreetingSettings, RunMode};

    const TEST_URL: &str = "http://localhost:3000";

    // ------------------------- helpers -------------------------
    fn production_app() -> impl Endpoint {
        build_app(GreetingSettings::new(Some(RunMode::Production)), TEST_URL)
    }

    fn development_app() -> impl Endpoint {
        build_app(GreetingSettings::new(Some(RunMode::Development)), TEST_URL)
    }

    fn unset_mode_app() -> impl Endpoint {
        build_app(GreetingSettings::new(None), TEST_URL)
    }

    async fn get(app: &impl Endpoint, path: &str) -> Response {
        let req = Request::builder().uri(path.parse().unwrap()).finish();
        app.get_response(req).await
    }

    async fn body_string(resp: Response) -> String {
        resp.into_body().into_string().await.unwrap()
    }

    // ------------------------- redirects -------------------------
    #[tokio::test]
    async fn production_redirects_to_user() {
        let app = production_app();
        let resp = get(&app, "/").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get("location").unwrap(), "/hello/User");
    }

    #[tokio::test]
    async fn development_redirects_to_dev() {
        let app = development_app();
        let resp = get(&app, "/").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get("location").unwrap(), "/hello/Dev");
    }

    #[tokio::test]
    async fn unset_mode_redirects_to_dev() {
        let app = unset_mode_app();
        let resp = get(&app, "/").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get("location").unwrap(), "/hello/Dev");
    }

    // ------------------------- routing -------------------------
    #[tokio::test]
    async fn empty_name_segment_is_not_found() {
        for mode in [Some(RunMode::Production), Some(RunMode::Development), None] {
            let app = build_app(GreetingSettings::new(mode), TEST_URL);
            let resp = get(&app, "/hello/").await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
    }

    // ------------------------- greeting page -------------------------
    #[tokio::test]
    async fn production_page_uses_production_color() {
        let app = production_app();
        let resp = get(&app, "/hello/Test").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.content_type().unwrap().starts_with("text/html"));
        let body = body_string(resp).await;
        assert!(body.contains("Hello, Test!"));
        assert!(body.contains("#27ae60"));
        assert!(!body.contains("#f39c12"));
    }

    #[tokio::test]
    async fn development_page_uses_development_color() {
        let app = development_app();
        let resp = get(&app, "/hello/Test").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        assert!(body.contains("#f39c12"));
        assert!(!body.contains("#27ae60"));
    }

    #[tokio::test]
    async fn production_page_labels_production() {
        let app = production_app();
        let body = body_string(get(&app, "/hello/Test").await).await;
        assert!(body.contains("Environment: <strong>production</strong>"));
    }

    #[tokio::test]
    async fn unset_mode_labels_development() {
        let app = unset_mode_app();
        let body = body_string(get(&app, "/hello/test").await).await;
        assert!(body.contains("Environment: <strong>development</strong>"));
    }

    // ------------------------- escaping -------------------------
    #[tokio::test]
    async fn script_injection_is_escaped() {
        let app = production_app();
        let resp = get(&app, "/hello/%3Cscript%3Ealert(1)%3C%2Fscript%3E").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        assert!(body.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[tokio::test]
    async fn multibyte_name_renders_intact() {
        let app = development_app();
        let resp = get(&app, "/hello/%E4%B8%96%E7%95%8C").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        assert!(body.contains("Hello, 世界!"));
    }

    // ------------------------- security headers -------------------------
    #[tokio::test]
    async fn responses_carry_security_headers() {
        let app = development_app();
        for path in ["/", "/hello/Test", "/version"] {
            let resp = get(&app, path).await;
            let csp = resp.headers().get("content-security-policy").unwrap();
            assert_eq!(csp, "default-src 'self'; style-src 'self' 'unsafe-inline'");
            let cto = resp.headers().get("x-content-type-options").unwrap();
            assert_eq!(cto, "nosniff");
        }
    }

    #[tokio::test]
    async fn not_found_carries_security_headers() {
        // The headers are cross-cutting: error replies get stamped too.
        let app = development_app();
        let resp = get(&app, "/hello/").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let csp = resp.headers().get("content-security-policy").unwrap();
        assert_eq!(csp, "default-src 'self'; style-src 'self' 'unsafe-inline'");
        let cto = resp.headers().get("x-content-type-options").unwrap();
        assert_eq!(cto, "nosniff");
    }

    // ------------------------- version -------------------------
    #[tokio::test]
    async fn version_endpoint_reports_package_version() {
        let app = development_app();
        let resp = get(&app, "/version").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["server_version"], env!("CARGO_PKG_VERSION"));
        assert!(json["rustc_version"].is_string());
    }
}
