// src/proxy/mod.rs

//! Synchronizing reverse proxy: every request drains pending work before it
//! is forwarded to the application.

pub mod dial;
pub mod server;

pub use dial::{DialPolicy, send_with_retry};
pub use server::{MAX_BODY_BYTES, ProxyState, bind, router, serve};
