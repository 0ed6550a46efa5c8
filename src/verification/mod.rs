//! Clients for the external key allocator and verification API.

pub mod api;
pub mod keys;
