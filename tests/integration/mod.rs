//! Integration Tests Module
//!
//! End-to-end tests for the Command Center client core: the six lifecycle
//! scenarios driven through a composed core with a mock HTTP API, plus
//! transport-level properties (backoff schedule, frame classification).

// Task lifecycle scenarios through the composed core
mod scenario_test;

// Backoff schedule and wire-frame classification
mod transport_test;
