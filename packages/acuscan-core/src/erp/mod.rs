//! ERP entity API integration: session client, OData models, and the
//! escalating lookup resolver.

pub mod client;
pub mod lookup;
pub mod model;

pub use client::{ApiError, AuthMode, ErpClient, VerifyResult};
pub use lookup::{
    escape_filter_literal, resolve, LookupError, SearchHit, SearchStrategy,
    DEFAULT_LOOKUP_BUDGET,
};
pub use model::{
    EndpointInfo, EndpointsResponse, Envelope, Field, FieldValue, FlatWarehouseRow,
    LoginRequest, StockItem, TokenResponse, WarehouseDetail,
};
