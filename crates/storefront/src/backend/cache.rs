//! Cache types for backend responses.

use std::sync::Arc;

use himal_core::ShippingRegion;

/// Cache key for backend lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Regions,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Regions(Arc<[ShippingRegion]>),
}
