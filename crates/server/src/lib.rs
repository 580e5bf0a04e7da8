//! OAuth 2.0 authorization server for the task manager.
//!
//! Issues opaque access and refresh tokens to registered API clients through
//! the authorization code (with PKCE), refresh token, client credentials and
//! device authorization grants, and validates those tokens for resource
//! servers.

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
