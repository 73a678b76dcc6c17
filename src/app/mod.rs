//! Firebase app handles and the registry the bridge resolves app names against.

mod constants;
mod errors;
mod registry;
mod types;

pub use constants::DEFAULT_ENTRY_NAME;
pub use errors::{AppError, AppResult};
pub use registry::AppRegistry;
pub use types::{FirebaseApp, FirebaseAppSettings, FirebaseOptions};
