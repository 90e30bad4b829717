//! Soapy Chat: a single-process, in-memory chat relay for the local network.
//!
//! Clients connect over WebSocket, optionally announce a display name, and
//! send text or image entries that are broadcast to every connected client.
//! New clients first receive the full history since start-up.
//!
//! - [`cli`] parses the command line for the `serve` and `client` modes.
//! - [`message`] defines the JSON wire protocol.
//! - [`registry`] tracks live sessions and their display names.
//! - [`history`] is the append-only log replayed to new sessions.
//! - [`relay`] ties the two together behind one lock and does the fan-out.
//! - [`server`] accepts WebSocket connections and runs one task per session.
//! - [`assets`] serves the browser page over plain HTTP.
//! - [`network`] guesses the LAN address shown in the start-up banner.
//! - [`client`] is a terminal client for the relay.

pub mod assets;
pub mod cli;
pub mod client;
pub mod error;
pub mod history;
pub mod message;
pub mod network;
pub mod registry;
pub mod relay;
pub mod server;
