mod auth;
mod avatar;
mod config;
mod database;
mod error;
mod forms;
mod model;
mod routes;
mod session;

use actix_web::{middleware::Logger, web, App, HttpServer};
use config::Config;
use log::info;
use std::io;

fn load_templates() -> Result<tera::Tera, tera::Error> {
    tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"))
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("watchlist=debug,actix_web=info"),
    )
    .init();

    let config = Config::from_env().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let tera = load_templates().map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let db = sled::open(&config.database)?;
    info!("Opened database at {}", config.database.display());

    let key = config.cookie_key();
    let bind = config.bind.clone();
    let tera = web::Data::new(tera);
    let db = web::Data::new(db);
    let config = web::Data::new(config);

    info!("Listening on {}", bind);
    HttpServer::new(move || {
        App::new()
            .wrap(session::identity_middleware())
            .wrap(session::session_middleware(key.clone(), config.secure_cookies))
            .wrap(Logger::default())
            .app_data(tera.clone())
            .app_data(db.clone())
            .app_data(config.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
