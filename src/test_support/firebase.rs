use crate::app::{FirebaseApp, FirebaseOptions};
use crate::firestore::api::Firestore;
use crate::firestore::model::DatabaseId;

pub const TEST_PROJECT_ID: &str = "test-project";

/// Build a standalone Firebase app scoped to the test project.
pub fn test_firebase_app() -> FirebaseApp {
    let options = FirebaseOptions {
        project_id: Some(TEST_PROJECT_ID.to_string()),
        ..Default::default()
    };
    FirebaseApp::new("test", options, false)
}

/// A `Firestore` handle for the default database of [`test_firebase_app`].
pub fn test_firestore() -> Firestore {
    Firestore::new(test_firebase_app(), DatabaseId::default(TEST_PROJECT_ID))
}
