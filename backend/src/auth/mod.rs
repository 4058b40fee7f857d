//! Authentication module: the session manager, token generator and the
//! request authenticator middleware, plus the HTTP endpoints exposing them.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod tokens;
