pub mod aggregate;
pub mod query;
pub mod visibility;

pub use aggregate::{EndpointStats, Granularity, Summary, TrendPoint};
pub use query::{QueryError, UsageQueries, UsageQuery};
pub use visibility::{Caller, Role, Scope, ScopeFilter};
