//! Service Layer
//!
//! Business logic behind the route handlers. Services take the caller's
//! `Principal` as an explicit argument and bound every store call with the
//! configured deadline.

mod feed;
mod identity;
mod lifecycle;
mod posts;

pub use feed::*;
pub use identity::*;
pub use lifecycle::*;
pub use posts::*;
