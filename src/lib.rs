//! # Canvas Integration Library
//!
//! An asynchronous Canvas LMS REST client with:
//! - Adaptive request pacing driven by the server's quota headers
//! - Exponential backoff retries honouring `Retry-After`
//! - An optional TTL response cache for GET requests
//! - `Link`-header pagination
//! - One-time background discovery of server capabilities
//! - Caller-controlled cancellation and deadlines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_canvas::{CanvasClient, CanvasConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CanvasConfig::builder()
//!         .base_url("https://school.instructure.com/api/v1")
//!         .access_token("7~xxxxxxxxxxxx")
//!         .build()?;
//!
//!     let client = CanvasClient::new(config)?;
//!
//!     let groups = client.assignment_groups().list(101).await?;
//!     for group in groups {
//!         println!("{}", group.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Authentication
pub mod auth;

// HTTP client and transport
pub mod client;

// Response caching
pub mod cache;

// Server capability discovery
pub mod capabilities;

// Pagination handling
pub mod pagination;

// API Services
pub mod services;

// Resilience patterns
pub mod resilience;

// Observability
pub mod observability;

// Re-exports for convenience
pub use auth::BearerToken;
pub use cache::{CacheKey, CacheStats, CachedResponse, ResponseCache};
pub use capabilities::CapabilityDescriptor;
pub use client::{CanvasClient, CanvasClientBuilder, RawResponse};
pub use config::{CanvasConfig, CanvasConfigBuilder, RetryConfig};
pub use errors::{CanvasError, CanvasErrorKind, CanvasResult};
pub use pagination::{Page, PaginationLinks, PaginationParams, Paginator};
pub use resilience::{BackoffPolicy, CallScope, RateGovernor, RateTier};
pub use types::*;
