//! Document store transport
//!
//! Typed calls against the CouchDB/Cloudant REST endpoints, built on the
//! retrying [`HttpClient`](crate::http::HttpClient):
//!
//! - Database management (`PUT`/`DELETE`/`HEAD /{db}`)
//! - Key-ordered scans (`_all_docs`), the changes feed, views and search indexes
//! - Mango queries (`_find`)
//! - Bulk writes (`_bulk_docs`) and revision lookups

mod client;
mod types;

pub use client::CouchClient;
pub use types::{
    seq_to_string, AllDocsQuery, AllDocsResponse, AllDocsRow, BulkDocResult, ChangeRow,
    ChangesQuery, ChangesResponse, DbInfo, FindRequest, FindResponse, IndexQuery, KeyRange,
    SearchResponse, SearchRow, ServerInfo, ViewResponse, ViewRow,
};
