//! Service Layer
//!
//! Cached read paths for shops and shop types. Each service pairs a
//! [`CacheClient`](guardcache_storage::CacheClient) with a
//! [`ShopStore`](crate::store::ShopStore).

mod shop_service;
mod shop_type_service;

pub use shop_service::*;
pub use shop_type_service::*;
