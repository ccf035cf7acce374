//! Type definitions

pub mod conflict;
pub mod distance_cache;
pub mod messages;
pub mod route;
pub mod schedule;
pub mod suggestion;

pub use conflict::*;
pub use distance_cache::*;
pub use messages::*;
pub use route::*;
pub use schedule::*;
pub use suggestion::*;
