pub mod default_route;
pub mod run_route;
pub mod stream_route;
