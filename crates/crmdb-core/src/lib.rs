//! CRMDB Core - Metadata catalog, entity store, and query execution.
//!
//! This crate evaluates CRM-style queries (filters, link entities, ordering,
//! paging) over records held in memory.

pub mod catalog;
pub mod error;
pub mod query;
pub mod storage;

pub use catalog::{
    AttributeDef, AttributeType, Catalog, EntityDef, MetadataLookup, OptionMetadata,
    SchemaBundle,
};
pub use error::Error;
pub use query::{
    Clock, ExecutionContext, FiscalCalendar, FiscalPeriod, FiscalPeriodTemplate, FiscalSettings,
    FiscalYearNaming, PagingCookie, QueryExecutor,
};
pub use storage::{EntityStore, MemoryStore};

/// Re-export protocol types.
pub use crmdb_proto as proto;
