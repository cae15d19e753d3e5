//! Switchyard - Entry point
//!
//! Serves the demo prefix router over HTTP/1.1.

use std::path::PathBuf;

use tracing::{error, info};

use switchyard_server::demo::demo_router;
use switchyard_server::{ConfigLoader, Server, DEFAULT_ENV_PREFIX};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("switchyard {}", switchyard_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Switchyard - Path-prefix HTTP router

USAGE:
    switchyard [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML)
    -h, --help             Print help information
    -v, --version          Print version information

ROUTES:
    /dump        Echo the request back as plain text
    /template    501 not implemented
    /form        501 not implemented
    /file        501 not implemented
    /session     501 not implemented
    (other)      404 not found

ENVIRONMENT VARIABLES:
    SWITCHYARD__SERVER__HTTP_ADDR            Bind address (default: 0.0.0.0:8080)
    SWITCHYARD__SERVER__REQUEST_TIMEOUT_MS   Body and handler timeout (default: 10000)
    SWITCHYARD__SERVER__MAX_BODY_BYTES       Request body limit (default: 1000000)
    SWITCHYARD__SERVER__MAX_CONNECTIONS      Connection limit (default: unlimited)
    SWITCHYARD__TELEMETRY__LOGGING__LEVEL    Log filter (default: info)
    SWITCHYARD__TELEMETRY__LOGGING__FORMAT   json or pretty (default: json)
    SWITCHYARD__TELEMETRY__METRICS__ADDR     Prometheus address (default: 0.0.0.0:9090)
    SWITCHYARD__ACCESS__DENY_PREFIXES        Comma-separated prefixes to refuse

    Variables are also read from a .env file in the working directory.

EXAMPLES:
    switchyard --config /etc/switchyard/switchyard.toml
    SWITCHYARD__SERVER__HTTP_ADDR=127.0.0.1:3000 switchyard
"
    );
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let loader = ConfigLoader::new()
        .with_dotenv()
        .with_env_prefix(DEFAULT_ENV_PREFIX);
    let loader = match &args.config {
        Some(path) => match loader.with_file(path) {
            Ok(loader) => loader,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                std::process::exit(1);
            }
        },
        None => loader,
    };

    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = switchyard_telemetry::init_telemetry(&config.telemetry) {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    info!("Starting Switchyard v{}", switchyard_server::VERSION);
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let router = match demo_router(&config.access, config.server.diagnostic_capacity) {
        Ok(router) => router,
        Err(e) => {
            error!("Failed to build router: {}", e);
            std::process::exit(1);
        }
    };

    let server = Server::new(config.server.server_config(), router);
    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
