//! Test utilities shared across crate-level unit tests.

pub mod firebase;

pub use firebase::{test_firebase_app, test_firestore, TEST_PROJECT_ID};
