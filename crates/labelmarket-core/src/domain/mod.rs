//! Domain model (ids, task state machine, leases, annotations, reviews, errors).

pub mod actor;
pub mod annotation;
pub mod contract;
pub mod errors;
pub mod ids;
pub mod lease;
pub mod review;
pub mod task;

pub use actor::{Actor, Role, is_allowed};
pub use annotation::{AnnotationNormalized, AnnotationPayload, AnnotationRaw, TaskAnnotations};
pub use contract::{ContractRecord, ContractStatus};
pub use errors::{LeaseError, StoreError};
pub use ids::{AnnotationId, AssetId, ContractId, Id, IdMarker, ReviewId, TaskId, UserId};
pub use lease::{LeaseToken, TaskLease};
pub use review::{ReviewDecision, ReviewRecord};
pub use task::{TaskRecord, TaskStatus};
