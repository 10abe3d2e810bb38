//! Core data models for queries and publication records.

mod query;
mod record;

pub use query::{FetchRequest, KeywordJoin, Query};
pub use record::{
    CanonicalRecord, DatePrecision, IntermediateRecord, PubDate, RecordBuilder, ResultSet,
    SourceKind,
};
