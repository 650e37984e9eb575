//! Integration test crate for the pipetest workspace.
//!
//! All tests live under `tests/`; this library is intentionally empty.
