//! Himal Bazaar Core - Shared types library.
//!
//! This crate provides the types shared by the Himal Bazaar components:
//! - `storefront` - Public-facing checkout and payment handoff
//! - `integration-tests` - End-to-end tests against a mocked backend
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. This keeps it lightweight and usable anywhere.
//!
//! # Modules
//!
//! - [`types`] - IDs, emails, prices, addresses, cart snapshots and shipping geography

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
