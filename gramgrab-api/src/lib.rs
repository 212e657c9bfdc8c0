// GramGrab API Library
//
// HTTP surface for the streaming download proxy

pub mod http;

pub use http::{create_router, AppState};
