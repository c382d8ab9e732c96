use actix_web::{get, post, web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use crate::{domain::RunRequest, services::RunManager};

#[post("/run")]
async fn start_run(manager: web::Data<RunManager>, body: web::Json<RunRequest>) -> HttpResponse {
    let handle = manager.start_run(body.into_inner());
    HttpResponse::Ok().json(handle)
}

#[get("/runs/{run_id}")]
async fn get_run(manager: web::Data<RunManager>, path: web::Path<String>) -> HttpResponse {
    let run = Uuid::parse_str(&path.into_inner())
        .ok()
        .and_then(|run_id| manager.get_run(run_id).ok());

    match run {
        Some(run) => HttpResponse::Ok().json(run),
        None => run_not_found(),
    }
}

pub fn run_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({"detail": "Run not found"}))
}
