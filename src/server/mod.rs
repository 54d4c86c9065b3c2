mod comic_routes;
pub mod config;
mod download_routes;
mod errors;
mod http_layers;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
