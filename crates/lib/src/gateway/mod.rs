//! Gateway: HTTP front door for the chat channels.
//!
//! Single port serves the health check and Bot Framework activities.
//! Inbound messages go through one queue; each conversation's turns run in order on its own worker.

mod dispatch;
mod server;
#[cfg(test)]
mod testing;

pub use dispatch::TurnDispatcher;
pub use server::{build_controller, run_gateway, GatewayState, TurnProcessor};
