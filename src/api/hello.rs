#![forbid(unsafe_code)]

use lazy_static::lazy_static;
use log::error;
use poem_openapi::{param::Path, payload::{Html, PlainText}, ApiResponse, OpenApi};
use tera::{Context, Tera};

use crate::utils::config::GreetingSettings;
use crate::utils::escape::escape_html;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const HELLO_TEMPLATE_NAME: &str = "hello";

// The name value is escaped by the handler before rendering.
const HELLO_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8">
    <title>App</title>
  </head>
  <body style="font-family: sans-serif; text-align: center;">
    <h1>Hello, {{ name }}!</h1>
    <p>Environment: <strong>{{ environment }}</strong></p>
    <div style="background: {{ status_color }}; color: white; padding: 10px; display: inline-block; border-radius: 5px;">
      Status: Active
    </div>
  </body>
</html>
"#;

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
lazy_static! {
    static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        tera.add_raw_template(HELLO_TEMPLATE_NAME, HELLO_TEMPLATE)
            .unwrap_or_else(|e| panic!("Invalid greeting page template: {}", e));
        // The handler escapes exactly once; tera must not escape again.
        tera.autoescape_on(vec![]);
        tera
    };
}

// ---------------------------------------------------------------------------
// init_templates:
// ---------------------------------------------------------------------------
/** Force template parsing at startup so that an invalid template aborts the
 * process before it serves requests.
 */
pub fn init_templates() {
    lazy_static::initialize(&TEMPLATES);
}

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct HelloApi {
    settings: GreetingSettings,
}

// ------------------- HTTP Status Codes -------------------
#[derive(ApiResponse)]
enum HelloResponse {
    #[oai(status = 200)]
    Http200(Html<String>),
    #[oai(status = 500)]
    Http500(PlainText<String>),
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl HelloApi {
    /// Render the greeting page for one non-empty path segment.  An empty
    /// segment (GET /hello/) never matches this route and yields 404 from
    /// the routing layer.
    #[oai(path = "/hello/:name", method = "get")]
    async fn get_hello(&self, name: Path<String>) -> HelloResponse {
        // -------------------- Escape Input --------------------------
        // The raw segment is attacker-controlled: arbitrary bytes,
        // unbounded length.  Escape it exactly once.
        let clean_name = escape_html(&name.0);

        // -------------------- Render Page ---------------------------
        let mut ctx = Context::new();
        ctx.insert("name", &clean_name);
        ctx.insert("environment", self.settings.environment_label());
        ctx.insert("status_color", self.settings.status_color());

        match TEMPLATES.render(HELLO_TEMPLATE_NAME, &ctx) {
            Ok(body) => HelloResponse::Http200(Html(body)),
            Err(e) => {
                let msg = format!("Unable to render the greeting page: {}", e);
                error!("{}", msg);
                HelloResponse::Http500(PlainText(msg))
            },
        }
    }
}

impl HelloApi {
    pub fn new(settings: GreetingSettings) -> Self {
        Self { settings }
    }
}
