//! Session and message plane (§4.1-§4.3): wire types, C9 MessageRouter,
//! C10 SessionHandler, and the axum upgrade route.

pub mod handler;
pub mod messages;
pub mod router;
pub mod routes;
