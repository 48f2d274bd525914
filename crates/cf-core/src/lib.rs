pub mod blob;
pub mod error;
pub mod item;
pub mod job;
pub mod mapping;
pub mod matching;

pub use blob::{Blob, BlobMeta};
pub use error::{retry_with_backoff, BackoffPolicy, CfError, CfResult, ErrorKind, ErrorSummary};
pub use item::{Entities, ItemAnalysis, NormalisedItem, RelationshipLink, Relationships, Sentiment};
pub use job::{
    InputDescriptor, Job, JobId, JobKind, JobStatus, ProgressEvent, ProgressSnapshot,
    ResultDescriptor,
};
pub use mapping::{CompiledMapping, FieldRule, RawMapping, StructureTemplate, Transform};
pub use matching::{Match, MatchEndpoint};
