//! Query translation module
//!
//! Maps tabular predicates, requested columns and read options onto one of
//! the store's access modes:
//!
//! - **All docs**: `_id` predicates become `startkey`/`endkey`
//! - **Selector**: pushable predicates become a Mango selector for `_find`
//! - **Changes**: the same selector is applied through `filter=_selector`
//! - **View / Search**: the configured path is passed through, with paging
//!
//! Predicates the store cannot evaluate exactly are reported as residual.
//! Every predicate is still evaluated client-side on decoded rows, so pushed
//! selectors may over-select but never drop a matching row.

mod filter;
mod translator;

pub use filter::{lookup, Filter};
pub use translator::{
    parse_selector, split_path, translate, AccessMode, QueryDescriptor, QueryTranslator,
    TranslatedQuery, MATCH_ALL_QUERY,
};

#[cfg(test)]
mod tests;
