//! grid-query - Server-side data grid backend
//!
//! grid-query turns the parameters a client-side data grid sends (page, page size,
//! sort and search filters) into a query against a data source, fetches one page,
//! renders every row into display cells and reports the total count plus optional
//! footer summaries.
//!
//! # Architecture
//!
//! - **Grid**: Named columns plus the request parameters of one grid instance
//! - **Translator**: Filter rules, sorting and paging applied to a copy of a base query
//! - **Adapters**: One per data source, sharing the translator and the renderer
//! - **Renderer**: Column values resolved through dotted identifiers, then formatted
//!
//! # Adapters
//!
//! - [`SelectAdapter`]: SQL through a [`DatabaseBackend`] (SQLite, PostgreSQL)
//! - [`CollectionAdapter`]: Rows already held in memory
//!
//! Both produce the same [`ResultSet`] and can stream every matching row for export.
//!
//! # Example
//!
//! ```rust,no_run
//! use grid_query::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     #[cfg(feature = "sqlite")]
//!     {
//!         use grid_query::sqlite::SqliteBackend;
//!
//!         let backend = SqliteBackend::file("shop.db").await?;
//!
//!         let params = GridParams::from_request(&json!({
//!             "page": "1",
//!             "rows": "20",
//!             "sidx": "name",
//!             "sord": "asc",
//!             "filters": r#"{"groupOp":"AND","rules":{"name":[{"operator":"~","value":"jo"}]}}"#
//!         }))?;
//!
//!         let grid = Grid::new("users")
//!             .column(Column::text("id", "u.id"))
//!             .column(Column::text("name", "u.name"))
//!             .with_params(params);
//!
//!         let query = SelectBuilder::new("users").alias("u").select(vec!["u.*"]);
//!         let mut adapter = SelectAdapter::new(backend).with_grid(grid).with_query(query);
//!         adapter.fetch_data(None).await?;
//!
//!         let response = adapter.result_set().to_response(1, 20);
//!         println!("{}", response.to_json()?);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backend Support
//!
//! Enable backends via Cargo features:
//!
//! ```toml
//! [dependencies]
//! grid-query = { version = "0.1", features = ["postgres", "sqlite"] }
//! ```
//!
//! The in-memory adapter needs no feature.

pub mod adapter;
pub mod backend;
pub mod builder;
pub mod collection;
pub mod column;
pub mod config;
pub mod error;
pub mod filter;
pub mod grid;
pub mod render;
pub mod result;
pub mod row;
pub mod select;
pub mod translate;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use adapter::{ExportItem, ExportStream, FetchContext, FetchInterceptor, GridAdapter};
pub use backend::{DatabaseBackend, QueryResult, QueryRow};
pub use builder::{
    AggregateFunc, ComparisonOp, Condition, JoinType, LogicalOp, Operand, OrderBy, SelectBuilder,
    SortDirection,
};
pub use collection::{CollectionAdapter, CollectionQuery};
pub use column::{Column, ColumnAttributes, ColumnFormat, ColumnKind, SearchType, SummaryType};
pub use config::GridConfig;
pub use error::{GridError, Result};
pub use filter::{Filter, FilterOperator, FilterRule};
pub use grid::{Grid, GridParams};
pub use result::{JqGridResponse, JqGridRow, RenderedRow, ResultSet};
pub use row::{AliasMap, RowData};
pub use select::SelectAdapter;
pub use translate::{translate, GridQuery};

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Prelude for common imports
pub mod prelude {
    pub use crate::adapter::{ExportItem, FetchInterceptor, GridAdapter};
    pub use crate::backend::DatabaseBackend;
    pub use crate::builder::{Condition, LogicalOp, SelectBuilder, SortDirection};
    pub use crate::collection::{CollectionAdapter, CollectionQuery};
    pub use crate::column::{Column, SummaryType};
    pub use crate::config::GridConfig;
    pub use crate::error::{GridError, Result};
    pub use crate::filter::{Filter, FilterOperator};
    pub use crate::grid::{Grid, GridParams};
    pub use crate::result::ResultSet;
    pub use crate::select::SelectAdapter;

    #[cfg(feature = "postgres")]
    pub use crate::postgres::PostgresBackend;

    #[cfg(feature = "sqlite")]
    pub use crate::sqlite::SqliteBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _grid = Grid::new("users").column(Column::text("name", "u.name"));
        let _config = GridConfig::default();
        let _op = FilterOperator::Contains;
        let _logic = LogicalOp::And;
    }
}
