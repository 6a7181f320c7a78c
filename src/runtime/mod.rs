//! Process lifecycle
//!
//! - `server`: build the view services and run the HTTP server
//! - `shutdown`: drain pending views once the server has stopped

pub mod server;
pub mod shutdown;

pub use server::run_server;
