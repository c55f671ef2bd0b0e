mod matcher;

pub use matcher::{CompiledRoute, RouteTable, UpstreamTarget};
