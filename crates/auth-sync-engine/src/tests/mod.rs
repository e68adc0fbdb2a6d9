//! Integration tests for the synchronization context.
//!
//! - `harness.rs`    - Mock providers and facade with call log, gates and
//!                     scripted failures
//! - `scenarios.rs`  - End-to-end scenarios: sign-in, sign-out, account
//!                     switch, unauthenticated exchange, teardown
//! - `invariants.rs` - No overlap, no blended identity, idempotence,
//!                     deferred replay, bounded retry, convergence
