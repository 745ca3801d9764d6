//! HTTP surface - routes, handlers, and image responses

pub mod handlers;
pub mod image;
pub mod routes;
