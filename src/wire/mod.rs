//! Remote session protocol
//!
//! TCP transport, length-delimited frames, one XML message per frame.
//! A driver connects to a target, handshakes, then drives the target's
//! framework object through request/response calls while log and
//! statistics events stream back one way.

#![allow(dead_code)]

pub mod client;
pub mod connection;
pub mod message;
pub mod server;

pub use client::RemoteSession;
pub use message::SuiteInfo;
pub use server::serve;

use crate::errors::ProgramError;

/// Port a target listens on when the endpoint names none.
pub const DEFAULT_PORT: u16 = 8888;

/// Endpoint used when driver and target share a machine.
pub const LOCAL_ENDPOINT: &str = "127.0.0.1:11111";

/// Normalize a `host[:port]` endpoint, defaulting the port.
pub fn parse_endpoint(input: &str) -> Result<String, ProgramError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ProgramError::new("endpoint must not be empty"));
    }
    match input.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(ProgramError::new(format!(
                    "endpoint has no host: {input}"
                )));
            }
            port.parse::<u16>().map_err(|_| {
                ProgramError::new(format!("endpoint has an invalid port: {input}"))
            })?;
            Ok(input.to_owned())
        }
        None => Ok(format!("{input}:{DEFAULT_PORT}")),
    }
}
