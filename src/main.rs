use nodewatch::config::settings::Settings;
use nodewatch::events::bus::EventBus;
use nodewatch::notify::webhook::Notifier;
use nodewatch::registry::service::Registry;
use nodewatch::transport::endpoint::Endpoint;
use nodewatch::web::server;

use std::sync::Arc;

// Exit codes per failure category, so supervisors can tell configuration
// problems apart: 3 unreadable config file, 4 unbindable endpoint, 5
// unsupported web scheme, 6 invalid endpoint spec, 7 no listeners, 8 no web
// interface.
const EXIT_BAD_CONFIG: i32 = 3;
const EXIT_BIND_FAILED: i32 = 4;
const EXIT_WEB_SCHEME: i32 = 5;
const EXIT_BAD_ENDPOINT: i32 = 6;
const EXIT_NO_LISTENERS: i32 = 7;
const EXIT_NO_WEB: i32 = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<String> = None;
    let mut web: Option<String> = None;
    let mut listen: Vec<String> = vec![];
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                config_path = args.get(i + 1).cloned();
                i += 2;
            }
            "-w" | "--web" => {
                web = args.get(i + 1).cloned();
                i += 2;
            }
            "-l" | "--listen" => {
                if let Some(spec) = args.get(i + 1) {
                    listen.push(spec.clone());
                }
                i += 2;
            }
            "-v" | "--verbose" => {
                verbose = true;
                i += 1;
            }
            "-h" | "--help" => {
                eprintln!(
                    "Usage: {} [--config <file.json>] [--listen <url>]... [--web <url>] [--verbose]",
                    args[0]
                );
                eprintln!(
                    "Example: {} --listen udp://0.0.0.0:8888 --web http://0.0.0.0:30826?status",
                    args[0]
                );
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    // 1. Configuration (file first, flags override):
    let mut settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    if !listen.is_empty() {
        settings.listen = listen;
    }
    if web.is_some() {
        settings.web = web;
    }
    if verbose {
        settings.debug = true;
    }

    tracing_subscriber::fmt()
        .with_max_level(if settings.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    if settings.listen.is_empty() {
        eprintln!("no listeners defined");
        std::process::exit(EXIT_NO_LISTENERS);
    }

    let Some(web_url) = settings.web.clone() else {
        eprintln!("no web interface configured");
        std::process::exit(EXIT_NO_WEB);
    };

    if let Err(e) = server::bind_addr(&web_url) {
        eprintln!("{}", e);
        let code = if web_url.starts_with("https:") {
            EXIT_WEB_SCHEME
        } else {
            EXIT_NO_WEB
        };
        std::process::exit(code);
    }

    let settings = Arc::new(settings);

    // 2. Event bus and registry:
    let bus = Arc::new(EventBus::new());
    let registry = Registry::start(settings.clone(), bus.clone());

    // 3. Transport listeners; one bad endpoint aborts startup, with the spec
    //    and bind failures reported under different exit codes:
    for spec in &settings.listen {
        if let Err(e) = Endpoint::parse(spec) {
            eprintln!("{}", e);
            std::process::exit(EXIT_BAD_ENDPOINT);
        }

        if let Err(e) = registry.listen(spec).await {
            eprintln!("{}", e);
            std::process::exit(EXIT_BIND_FAILED);
        }
    }

    // 4. Outbound notification hooks:
    if !settings.hooks.is_empty() {
        Notifier::start(bus.clone(), settings.hooks.clone());
    }

    // 5. Web interface, until ctrl-c:
    tracing::info!("Press Ctrl+C to shutdown");

    tokio::select! {
        result = server::serve(settings.clone(), registry.clone()) => {
            if let Err(e) = result {
                tracing::error!("Web interface failed: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    registry.shutdown().await;

    Ok(())
}
