use actix_web::{get, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

#[get("/")]
async fn default() -> impl Responder {
    HttpResponse::Ok().body("Hi there, ready to roast some landing pages!")
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "healthy", "timestamp": Utc::now()}))
}

#[get("/ready")]
async fn ready() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ready", "timestamp": Utc::now()}))
}
