//! HTTP surface: routing, request decoding and error rendering.

mod error;
mod extract;
mod handlers;
mod router;

pub use router::{build_router, AppState};
