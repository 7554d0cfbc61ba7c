use std::io;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use mongodb::Client;
use tracing_subscriber::EnvFilter;

use groupsplit::config::Config;
use groupsplit::events::GroupEvents;
use groupsplit::routes::{self, AppState};
use groupsplit::store::MongoStore;

fn cors(allowed_origin: Option<&str>) -> Cors {
    match allowed_origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allow_any_header()
            .supports_credentials(),
        None => Cors::permissive(),
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config =
        Config::from_env().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    tracing::info!(
        database = %config.database_name,
        policy = ?config.untracked_policy,
        "connecting to MongoDB"
    );

    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .map_err(io::Error::other)?;
    let store = MongoStore::new(&client.database(&config.database_name))
        .await
        .map_err(io::Error::other)?;
    tracing::info!(
        address = %config.bind_address,
        port = config.port,
        "starting server"
    );

    let state = web::Data::new(AppState::new(
        store,
        GroupEvents::default(),
        config.untracked_policy,
    ));
    let allowed_origin = config.allowed_origin.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors(allowed_origin.as_deref()))
            .wrap(Logger::default())
            .configure(routes::configure::<MongoStore>)
    })
    .bind((config.bind_address, config.port))?
    .run()
    .await
}
