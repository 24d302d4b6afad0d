//! Translation Module
//!
//! Bridges client commands and backend messages in both directions.

mod request;
mod response;
pub mod sibling;

pub use request::{
    content_type_for, plan_del, DelPlan, RequestTranslator, RoutedKey, CONTENT_TYPE_JSON,
    CONTENT_TYPE_TEXT, CONTENT_TYPE_XML,
};
pub use response::{
    backend_error_reply, cached_members, classify_backend_error, get_outcome, invalidate,
    is_set_cache_miss, populate_set, populate_value, replace_set, set_algebra, set_query_reply,
    strip_quotes, GetOutcome, SetQuery,
};
