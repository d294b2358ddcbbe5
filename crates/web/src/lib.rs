//! Hello World responder
//!
//! A deliberately content-free HTTP server: every request, whatever its
//! method or path, is answered with `200 OK` and [`HELLO_PAGE`]. It exists
//! to be the system under test for the `hello-e2e` acceptance harness.

pub mod config;
pub mod server;

pub use config::ResponderConfig;
pub use server::{router, serve, serve_with_shutdown, HELLO_PAGE};
