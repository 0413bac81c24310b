//! Route registry and path matching.

mod router;

pub use router::{RouteDef, RouteEntry, RouteSnapshot, Router};
