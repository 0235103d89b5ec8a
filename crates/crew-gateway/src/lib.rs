//! HTTP and WebSocket surface for the crew comments service.
//!
//! Routes the comment CRUD and read-state operations, triggers the reply
//! dispatcher, and exposes the live fan-out to connected viewers. Auth
//! middleware is deployed in front of this service; handlers trust the
//! identity headers the proxy sets.

pub mod gateway_identity;
pub mod gateway_routes;
pub mod gateway_ws;

pub use gateway_identity::*;
pub use gateway_routes::*;
pub use gateway_ws::*;
