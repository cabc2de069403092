//! Gateway: the HTTP endpoint the chat platform calls.
//!
//! Single port. `POST /callback` authenticates the request with the channel secret,
//! hands the event batch to the dispatcher, and maps the outcome to 200 or 500.

mod server;

pub use server::{build_router, run_gateway, GatewayState};
