use std::{net::TcpListener, path::PathBuf};

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};

use crate::{
    configuration::ApplicationSettings,
    routes::{default_route, run_route, stream_route},
    services::RunManager,
};

/// Browser clients are served from any origin, credentials included.
pub fn cors() -> Cors {
    Cors::permissive()
}

pub fn run(
    listener: TcpListener,
    run_manager: RunManager,
    application: ApplicationSettings,
    artifacts_root: PathBuf,
) -> Result<Server, std::io::Error> {
    let run_manager = web::Data::new(run_manager);
    let application = web::Data::new(application);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .wrap(Logger::default())
            .service(Files::new("/artifacts", artifacts_root.clone()))
            .service(default_route::default)
            .service(default_route::health)
            .service(default_route::ready)
            .service(run_route::start_run)
            .service(run_route::get_run)
            .service(stream_route::stream_run)
            .app_data(run_manager.clone())
            .app_data(application.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
