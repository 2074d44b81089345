#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use log::{info, error, LevelFilter};
use serde::Deserialize;
use std::{env, fs, path::Path};
use std::ops::Deref;
use std::os::unix::fs::PermissionsExt;
use toml;
use fs_mistrust::Mistrust;
use lazy_static::lazy_static;
use path_absolutize::Absolutize;
use structopt::StructOpt;

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

// Greeting utilities
use crate::utils::errors::Errors;

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Directory and file locations. Unless otherwise noted, all files and directories
// are relative to the root directory.
const ENV_GREETING_ROOT_DIR : &str = "GREETING_ROOT_DIR";
const DEFAULT_ROOT_DIR      : &str = "~/.greeting";
const CONFIG_DIR            : &str = "/config";
const LOGS_DIR              : &str = "/logs";
const LOG4RS_CONFIG_FILE    : &str = "/log4rs.yml";      // relative to config dir
const GREETING_CONFIG_FILE  : &str = "/greeting.toml";   // relative to config dir

// Networking.
const DEFAULT_HTTP_ADDR     : &str = "http://localhost";
const DEFAULT_HTTP_PORT     : u16  = 3000;

// Run mode selection. The mode can arrive from three places; the
// command line wins over the environment, which wins over the file.
const ENV_GREETING_RUN_MODE : &str = "GREETING_RUN_MODE";

// Mode-derived rendering constants.
const PRODUCTION_DEFAULT_NAME  : &str = "User";
const DEVELOPMENT_DEFAULT_NAME : &str = "Dev";
const PRODUCTION_STATUS_COLOR  : &str = "#27ae60";
const DEVELOPMENT_STATUS_COLOR : &str = "#f39c12";

// Label rendered when no run mode was configured at all. This is a
// string-level fallback for missing configuration, not a semantic branch.
const UNSET_MODE_LABEL         : &str = "development";

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Assign the command line arguments BEFORE RUNTIME_CTX is initialized in main.
lazy_static! {
    pub static ref GREETING_ARGS: GreetingArgs = init_greeting_args();
}

// Calculate the data directories BEFORE RUNTIME_CTX is initialized in main.
lazy_static! {
    pub static ref GREETING_DIRS: GreetingDirs = init_greeting_dirs();
}

// ***************************************************************************
//                             Directory Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// GreetingDirs:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct GreetingDirs {
    pub root_dir: String,
    pub config_dir: String,
    pub logs_dir: String,
}

// ***************************************************************************
//                               Config Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// CommandLineArgs:
// ---------------------------------------------------------------------------
#[derive(Debug, StructOpt)]
#[structopt(name = "greeting_args", about = "Command line arguments for the greeting server.")]
pub struct GreetingArgs {
    /// Specify the server's root data directory.
    ///
    /// This directory contains the configuration and log files the server
    /// uses during execution.
    #[structopt(long)]
    pub root_dir: Option<String>,

    /// Specify the run mode (production or development).
    ///
    /// Overrides both the GREETING_RUN_MODE environment variable and the
    /// run_mode setting in the configuration file.
    #[structopt(long)]
    pub run_mode: Option<String>,

    /// Specify the HTTP port, overriding the configuration file.
    #[structopt(long)]
    pub http_port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Parms:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct Parms {
    pub config_file: String,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// RuntimeCtx:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct RuntimeCtx {
    pub parms: Parms,
    pub args: &'static GreetingArgs,
    pub dirs: &'static GreetingDirs,
}

// ---------------------------------------------------------------------------
// Config:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct Config {
    pub title: String,
    pub http_addr: String,
    pub http_port: u16,
    pub run_mode: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /** Resolve the configured run mode string using the priority order:
     * command line argument, environment variable, configuration file.
     * None means no mode was configured anywhere.
     */
    pub fn resolved_run_mode(&self) -> Option<String> {
        if let Some(mode) = &GREETING_ARGS.run_mode {
            return Some(mode.clone());
        }
        if let Ok(mode) = env::var(ENV_GREETING_RUN_MODE) {
            return Some(mode);
        }
        self.run_mode.clone()
    }

    /** Resolve the HTTP port, letting the command line override the file. */
    pub fn resolved_http_port(&self) -> u16 {
        GREETING_ARGS.http_port.unwrap_or(self.http_port)
    }

    /** Build the immutable per-request settings injected into the endpoint
     * constructors. Request handlers never read the environment themselves.
     */
    pub fn greeting_settings(&self) -> GreetingSettings {
        GreetingSettings::new(self.resolved_run_mode().as_deref().map(RunMode::parse))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Greeting Server".to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            run_mode: None,
        }
    }
}

// ***************************************************************************
//                             Run Mode Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// RunMode:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Production,
    Development,
}

impl RunMode {
    /** Parse a configured mode string. Only "production" (case-insensitive)
     * selects production; any other configured value runs as development.
     */
    pub fn parse(mode: &str) -> RunMode {
        if mode.eq_ignore_ascii_case("production") {
            RunMode::Production
        } else {
            RunMode::Development
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Production => "production",
            RunMode::Development => "development",
        }
    }
}

// ---------------------------------------------------------------------------
// GreetingSettings:
// ---------------------------------------------------------------------------
/** Mode-derived values fixed at startup and shared read-only by all requests.
 * A None mode means no mode was configured at all, which counts as
 * non-production everywhere and additionally affects the page label.
 */
#[derive(Debug, Clone, Copy)]
pub struct GreetingSettings {
    mode: Option<RunMode>,
}

impl GreetingSettings {
    pub fn new(mode: Option<RunMode>) -> Self {
        Self { mode }
    }

    fn is_production(&self) -> bool {
        matches!(self.mode, Some(RunMode::Production))
    }

    /** Default display name used by the root redirect. */
    pub fn default_name(&self) -> &'static str {
        if self.is_production() {PRODUCTION_DEFAULT_NAME} else {DEVELOPMENT_DEFAULT_NAME}
    }

    /** Status badge color rendered on the greeting page. */
    pub fn status_color(&self) -> &'static str {
        if self.is_production() {PRODUCTION_STATUS_COLOR} else {DEVELOPMENT_STATUS_COLOR}
    }

    /** Mode name shown on the greeting page. Missing configuration reads
     * as "development".
     */
    pub fn environment_label(&self) -> &'static str {
        match self.mode {
            Some(mode) => mode.label(),
            None => UNSET_MODE_LABEL,
        }
    }
}

// ***************************************************************************
//                            Directory Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_greeting_args:
// ---------------------------------------------------------------------------
/** Get the command line arguments. */
fn init_greeting_args() -> GreetingArgs {
    let args = GreetingArgs::from_args();
    println!("{:?}", args);
    args
}

// ---------------------------------------------------------------------------
// init_greeting_dirs:
// ---------------------------------------------------------------------------
/** Calculate the external data directories. */
fn init_greeting_dirs() -> GreetingDirs {
    // Initialize the mistrust object.
    let mistrust = get_mistrust();

    // Check that each path is absolute and is a directory with the
    // proper permission assign if it exists.  If it doesn't exist,
    // create it.
    let root_dir = get_root_dir();
    check_greeting_dir(&root_dir, "root directory", &mistrust);

    let config_dir = root_dir.clone() + CONFIG_DIR;
    check_greeting_dir(&config_dir, "config directory", &mistrust);

    let logs_dir = root_dir.clone() + LOGS_DIR;
    check_greeting_dir(&logs_dir, "logs directory", &mistrust);

    // Package up and return the directories.
    GreetingDirs {
        root_dir, config_dir, logs_dir,
    }
}

// ---------------------------------------------------------------------------
// check_greeting_dir:
// ---------------------------------------------------------------------------
/** Check that the path is absolute and, if it exists, that is has the proper
 * permissions assigned.  If it doesn't exist, create it.  The mistrust package
 * creates directories with 0o700 permissions.
 *
 * Any failure results in a panic.
 */
fn check_greeting_dir(dir: &String, msgname: &str, mistrust: &Mistrust) {
    // Get the path object.
    let path = Path::new(dir);
    if !path.is_absolute() {
        panic!("The server's {} path must be absolute: {}", msgname, dir);
    }
    if path.exists() {
        // Make sure the path represents a directory.
        if !path.is_dir() {
            panic!("The server's {} path must be a directory: {}", msgname, dir);
        }

        // Make sure the directory had rwx for owner only.
        let meta = path.metadata().unwrap_or_else(|_| panic!("Unable to read metadata for {}: {}", msgname, dir));
        let perm = meta.permissions().mode();
        if perm & 0o777 != 0o700 {
            panic!("The server's {} path must be have 0o700 permissions: {}", msgname, dir);
        }
    } else {
        // Create the directory with the correct permissions.
        match mistrust.make_directory(path) {
            Ok(_) => (),
            Err(e) => {
                panic!("Make directory error for {:?}: {}", path, &e.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// get_mistrust:
// ---------------------------------------------------------------------------
/** Configure a new mistrust object for initial directory processing. */
fn get_mistrust() -> Mistrust {
    // Configure our mistrust object.
    let mistrust = match Mistrust::builder()
        .ignore_prefix(get_absolute_path("~"))
        .trust_group(0)
        .build() {
            Ok(m) => m,
            Err(e) => {
                panic!("Mistrust configuration error: {}", &e.to_string());
            }
        };
    mistrust
}

// ---------------------------------------------------------------------------
// get_root_dir:
// ---------------------------------------------------------------------------
fn get_root_dir() -> String {
    // Order of precedence:
    //  1. Environment variable
    //  2. Command line --root-dir argument
    //  3. Default location
    //
    let root_dir = env::var(ENV_GREETING_ROOT_DIR).unwrap_or_else(
        |_| {
            match GREETING_ARGS.root_dir.clone() {
                Some(r) => r,
                None => DEFAULT_ROOT_DIR.to_string(),
            }
        });

    // Canonicalize the path.
    get_absolute_path(&root_dir)
}

// ---------------------------------------------------------------------------
// get_absolute_path:
// ---------------------------------------------------------------------------
/** Replace tilde (~) and environment variable values in a path name and
 * then construct the absolute path name.  Unlike canonicalize, absolutize
 * does not care whether the file exists.  Errors return the original path.
 */
fn get_absolute_path(path: &str) -> String {
    // Replace ~ and environment variable values if possible.
    // On error, return the string version of the original path.
    let s = match shellexpand::full(path) {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };

    // Convert to absolute path if necessary.
    // Return original input on error.
    let p = Path::new(s.deref());
    let p1 = match p.absolutize() {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };
    let p2 = match p1.to_str() {
        Some(x) => x,
        None => return path.to_owned(),
    };

    p2.to_owned()
}

// ***************************************************************************
//                               Log Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_log:
// ---------------------------------------------------------------------------
/** Initialize log4rs logging. A log4rs.yml file in the config directory
 * takes precedence; otherwise a console appender at INFO level is installed.
 */
pub fn init_log() {
    let logconfig = init_log_config();
    if Path::new(&logconfig).exists() {
        match log4rs::init_file(logconfig.clone(), Default::default()) {
            Ok(_) => (),
            Err(e) => {
                println!("{}", e);
                let s = format!("{}", Errors::Log4rsInitialization(logconfig.clone()));
                panic!("{}", s);
            },
        }
        info!("Log4rs initialized using: {}", logconfig);
    } else {
        init_default_log();
        info!("Log4rs initialized with the default console configuration.");
    }
}

// ---------------------------------------------------------------------------
// init_default_log:
// ---------------------------------------------------------------------------
fn init_default_log() {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}")))
        .build();
    let config = match log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info)) {
            Ok(c) => c,
            Err(e) => panic!("Unable to assemble the default log configuration: {}", e),
        };
    if let Err(e) = log4rs::init_config(config) {
        let s = format!("{}", Errors::Log4rsInitialization(e.to_string()));
        panic!("{}", s);
    }
}

// ---------------------------------------------------------------------------
// init_log_config:
// ---------------------------------------------------------------------------
fn init_log_config() -> String {
    GREETING_DIRS.config_dir.clone() + LOG4RS_CONFIG_FILE
}

/// ***************************************************************************
//                             Parms Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_parms:
// ---------------------------------------------------------------------------
/** Retrieve the application parameters from the configuration file in the
 * config directory.  If the file cannot be read, default values are used.
 */
fn get_parms() -> Result<Parms> {
    // Get the config file path from its data directory.
    let config_file = GREETING_DIRS.config_dir.clone() + GREETING_CONFIG_FILE;

    // Read the configuration file.
    let config_file_abs = get_absolute_path(&config_file);
    info!("{}", Errors::ReadingConfigFile(config_file_abs.clone()));
    let contents = match fs::read_to_string(&config_file_abs) {
        Ok(c) => c,
        Err(_) => {
            println!("Unable to read configuration at {}. Using default values.", config_file);
            return Ok(Parms { config_file: Default::default(), config: Config::new() });
        }
    };

    // Parse the toml configuration.
    let config : Config = match toml::from_str(&contents) {
        Ok(c)  => c,
        Err(e) => {
            let msg = format!("{}\n   {}", Errors::TOMLParseError(config_file_abs), e);
            error!("{}", msg);
            return Result::Err(anyhow!(msg));
        }
    };

    Ok(Parms { config_file: config_file_abs, config })
}

// ***************************************************************************
//                             Config Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_runtime_context:
// ---------------------------------------------------------------------------
pub fn init_runtime_context() -> RuntimeCtx {
    // If this fails the application aborts.
    let parms = get_parms().expect("FAILED to read configuration file.");
    RuntimeCtx {parms, args: &GREETING_ARGS, dirs: &GREETING_DIRS}
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use crate::utils::config::{Config, GreetingSettings, RunMode};

    #[test]
    fn print_config() {
        println!("{:?}", Config::new());
    }

    #[test]
    fn parse_run_mode() {
        assert_eq!(RunMode::parse("production"), RunMode::Production);
        assert_eq!(RunMode::parse("PRODUCTION"), RunMode::Production);
        assert_eq!(RunMode::parse("development"), RunMode::Development);
        // Unrecognized values run as development.
        assert_eq!(RunMode::parse("staging"), RunMode::Development);
        assert_eq!(RunMode::parse(""), RunMode::Development);
    }

    #[test]
    fn production_settings() {
        let settings = GreetingSettings::new(Some(RunMode::Production));
        assert_eq!(settings.default_name(), "User");
        assert_eq!(settings.status_color(), "#27ae60");
        assert_eq!(settings.environment_label(), "production");
    }

    #[test]
    fn development_settings() {
        let settings = GreetingSettings::new(Some(RunMode::Development));
        assert_eq!(settings.default_name(), "Dev");
        assert_eq!(settings.status_color(), "#f39c12");
        assert_eq!(settings.environment_label(), "development");
    }

    #[test]
    fn unset_mode_settings() {
        // No configured mode counts as non-production and labels the
        // page "development".
        let settings = GreetingSettings::new(None);
        assert_eq!(settings.default_name(), "Dev");
        assert_eq!(settings.status_color(), "#f39c12");
        assert_eq!(settings.environment_label(), "development");
    }
}
