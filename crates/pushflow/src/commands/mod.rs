pub mod certs;
pub mod deploy;
pub mod diff;
pub mod list;
pub mod render;
pub mod services;
