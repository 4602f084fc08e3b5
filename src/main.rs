use actix_web::{middleware, web, App, HttpServer};
use ecg_relay::config::{self, Settings};
use ecg_relay::server::{self, routes, Relay};
use ecg_relay::upstream::OpenAiClient;
use std::sync::Arc;
use std::{env, io, process};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./ecg-relay [config file]";

fn get_args() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        println!("{USAGE}");
        process::exit(1);
    }

    args.get(1).cloned()
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config_file = get_args();
    let settings = Settings::load(config_file.as_deref()).map_err(io::Error::other)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let api_key = config::api_key_from_env();
    if api_key.is_none() {
        warn!(
            "{} is not set; upstream calls will be rejected",
            config::API_KEY_VAR
        );
    }

    let client = OpenAiClient::from_settings(&settings, api_key).map_err(io::Error::other)?;
    info!("relaying to {client:?} with model {}", settings.model);

    let relay = web::Data::new(Relay::new(
        Arc::new(client),
        settings.model.clone(),
        settings.max_output_tokens,
    ));
    let max_body_bytes = settings.max_body_bytes;

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(relay.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .wrap(server::cors())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(settings.bind_addr())?
    .run()
    .await
}
