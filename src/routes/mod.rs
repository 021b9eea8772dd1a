// HTTP route handlers.
//
// The engine only exposes an operational surface; strategy management and
// trading stay behind the internal service contracts.

/// Health check and monitoring endpoints
pub mod health;
