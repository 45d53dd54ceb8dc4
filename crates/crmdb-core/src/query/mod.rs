//! Query engine for CRMDB.
//!
//! This module compiles `QueryExpression` descriptors into filter trees and
//! link plans, and runs them against an entity store.

mod compare;
mod condition;
mod context;
mod executor;
mod filter;
mod fiscal;
mod join;
mod paging;
mod projection;

pub use compare::{compare_for_sort, compare_keys, keys_equal, parse_datetime, Key};
pub use condition::{like_match, CompiledCondition};
pub use context::{
    Clock, ExecutionContext, DEFAULT_CASE_SENSITIVE, DEFAULT_STRICT, DEFAULT_WEEK_START,
};
pub use executor::QueryExecutor;
pub use filter::{extract_filter_aliases, CompiledFilter, FilterScope};
pub use fiscal::{
    FiscalCalendar, FiscalPeriod, FiscalPeriodTemplate, FiscalSettings, FiscalYearNaming,
    DEFAULT_FISCAL_START_DAY, DEFAULT_FISCAL_START_MONTH,
};
pub use join::{resolve_links, JoinStrategy, LinkPlanner, PreparedLink};
pub use paging::{apply_paging, Page, PagingCookie};
pub use projection::{Projector, MULTI_SELECT_LABEL_SEPARATOR};
