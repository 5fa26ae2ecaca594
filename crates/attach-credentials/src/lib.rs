#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]

mod attach;
mod client;
mod encoders;
pub mod error;
mod expiry;
mod params;
mod plugin;
mod record;
mod refresh;
mod store;

pub use attach::*;
pub use client::*;
pub use encoders::*;
pub use error::{BoxError, Error, Result};
pub use expiry::*;
pub use params::*;
pub use plugin::*;
pub use record::*;
pub use refresh::*;
pub use store::*;
