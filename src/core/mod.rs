pub mod rewrite;
pub mod route_table;
pub mod session;

pub use rewrite::{HeaderCase, ResponseRewrite, rewrite_request};
pub use route_table::{ReloadSummary, Route, RouteSnapshot, RouteTable, Target};
pub use session::{DEFAULT_SESSION_COOKIE, SessionRouter};
