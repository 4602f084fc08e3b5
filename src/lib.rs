pub mod config;
pub mod interpret;
pub mod prompt;
pub mod server;
pub mod upstream;

pub use server::RelayError;
