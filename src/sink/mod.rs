pub mod elastic;
pub mod traits;

pub use elastic::{ClusterInfo, ElasticSink};
pub use traits::{BulkFailure, BulkOutcome, BulkSink, ClusterHealth, HealthStatus, IndexStats, SinkError};
