#[macro_use]
extern crate lazy_static;

pub mod callback;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod input;
pub mod macos;
pub mod output;
pub mod params;
pub mod x_callback_url;
