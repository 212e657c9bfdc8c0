pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod shortcode;

pub use cache::{CachedPost, ExpiringCache, PostCache};
pub use config::Config;
pub use error::{Error, Result};
pub use provider::{HttpPostResolver, PostInfo, PostResolver, ResolveError};
