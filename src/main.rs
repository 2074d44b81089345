#![forbid(unsafe_code)]

use lazy_static::lazy_static;
use log::info;
use poem::listener::TcpListener;

// Greeting utilities
use crate::utils::config::{init_log, init_runtime_context, RuntimeCtx};
use crate::utils::errors::Errors;

// Modules
mod api;
mod utils;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const SERVER_NAME : &str = "GreetingServer"; // for poem logging

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Lazily initialize the parameters variable so that is has a 'static lifetime.
// We exit if we can't read our parameters.
lazy_static! {
    static ref RUNTIME_CTX: RuntimeCtx = init_runtime_context();
}

// ---------------------------------------------------------------------------
// main:
// ---------------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    // --------------- Initialize Server --------------
    // Announce ourselves.
    println!("Starting greeting_server!");

    // Initialize the server.
    greeting_init();

    // --------------- Main Loop Set Up ---------------
    // Assign base URL.
    let http_port = RUNTIME_CTX.parms.config.resolved_http_port();
    let greeting_url = format!("{}:{}",
        RUNTIME_CTX.parms.config.http_addr,
        http_port);

    // The run mode is injected into the endpoints once, at construction.
    let settings = RUNTIME_CTX.parms.config.greeting_settings();
    let app = api::build_app(settings, &greeting_url);

    // ------------------ Main Loop -------------------
    let addr = format!("{}{}", "0.0.0.0:", http_port);
    poem::Server::new(TcpListener::bind(addr))
        .name(SERVER_NAME)
        .run(app)
        .await
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// greeting_init:
// ---------------------------------------------------------------------------
/** Initialize all subsystems and data structures other than those needed
 * to configure the main loop processor.
 */
fn greeting_init() {
    // Configure our log.
    init_log();

    // Force the reading of input parameters and initialization of the
    // runtime context.
    info!("{}", Errors::InputParms(format!("{:#?}", *RUNTIME_CTX)));

    // Log build info.
    print_version_info();

    // Parse the greeting page template.
    api::hello::init_templates();
}

// ---------------------------------------------------------------------------
// print_version_info:
// ---------------------------------------------------------------------------
fn print_version_info() {
    // Log build info.
    info!("{}.", format!("\n*** Running GREETING={}, BRANCH={}, COMMIT={}, DIRTY={}, SRC_TS={}, RUSTC={}",
                        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
                        env!("GIT_BRANCH"),
                        env!("GIT_COMMIT_SHORT"),
                        env!("GIT_DIRTY"),
                        env!("SOURCE_TIMESTAMP"),
                        env!("RUSTC_VERSION")),
    );
}
