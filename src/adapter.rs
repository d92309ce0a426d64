//! Data-source adapter contract.
//!
//! An adapter owns a query handle and a [`Grid`]. `prepare` translates the grid
//! request onto the query once, `fetch_data` runs it and renders the page, and
//! `export` streams every matching row.

use crate::error::{GridError, Result};
use crate::grid::Grid;
use crate::result::{RenderedRow, ResultSet};
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;

/// What an interceptor sees besides the result set.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub adapter: &'a str,
    pub grid: &'a Grid,
}

/// Post-fetch hook; returns the result set to keep.
pub trait FetchInterceptor: Send + Sync {
    fn intercept(&self, context: &FetchContext<'_>, result: ResultSet) -> ResultSet;
}

impl<F> FetchInterceptor for F
where
    F: Fn(&FetchContext<'_>, ResultSet) -> ResultSet + Send + Sync,
{
    fn intercept(&self, context: &FetchContext<'_>, result: ResultSet) -> ResultSet {
        self(context, result)
    }
}

/// One element of an export stream.
#[derive(Debug)]
pub enum ExportItem {
    /// Number of rows that follow; always the first item.
    Total(usize),
    Row(RenderedRow),
    /// Terminal failure; nothing follows.
    Failed(GridError),
}

impl ExportItem {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExportItem::Failed(_))
    }
}

/// Pull-based stream of export items.
pub type ExportStream<'a> = Pin<Box<dyn Stream<Item = ExportItem> + Send + 'a>>;

/// A single failure as a stream.
pub(crate) fn failed_stream<'a>(error: GridError) -> ExportStream<'a> {
    Box::pin(futures::stream::once(async move { ExportItem::Failed(error) }))
}

#[async_trait]
pub trait GridAdapter: Send {
    /// Adapter name reported to interceptors.
    fn name(&self) -> &str;

    fn is_prepared(&self) -> bool;

    /// Translate the grid request onto the query. Calling it again is a no-op.
    fn prepare(&mut self) -> Result<()>;

    /// Run the prepared query and rebuild the result set.
    async fn fetch_data(&mut self, interceptor: Option<&dyn FetchInterceptor>) -> Result<()>;

    fn result_set(&self) -> &ResultSet;

    /// Stream rendered rows for `keys`, or for every matching row when empty.
    fn export(&mut self, keys: Vec<Value>) -> ExportStream<'_>;
}

/// Run the interceptor, if any, over a freshly built result set.
pub(crate) fn intercept(
    interceptor: Option<&dyn FetchInterceptor>,
    adapter: &str,
    grid: &Grid,
    result: ResultSet,
) -> ResultSet {
    match interceptor {
        Some(interceptor) => interceptor.intercept(&FetchContext { adapter, grid }, result),
        None => result,
    }
}
