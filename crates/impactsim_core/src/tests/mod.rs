//! Session-level tests against an in-memory engine
//!
//! Tests are organized by topic:
//! - `engine_double` - Fake engine, fake provider source and a boiler fixture
//! - `session` - Phase sequencing, run counts, failure handling
//! - `substitution` - Exchange rebinding, unit reconciliation, caching

mod session;
