use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::constants::DEFAULT_ENTRY_NAME;
use crate::app::errors::{AppError, AppResult};
use crate::app::types::{FirebaseApp, FirebaseAppSettings, FirebaseOptions};

/// Apps known to one bridge instance, keyed by name.
///
/// The registry is owned by whoever hosts the bridge (usually a
/// [`FirestoreModule`](crate::firestore::bridge::FirestoreModule)) instead of living
/// in a process-wide static, so tests and embedders get isolated app sets.
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: Arc<Mutex<HashMap<String, FirebaseApp>>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, FirebaseApp>> {
        self.apps.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Creates (or returns the identical existing) app described by `options`.
    pub fn initialize_app(
        &self,
        options: FirebaseOptions,
        settings: Option<FirebaseAppSettings>,
    ) -> AppResult<FirebaseApp> {
        let settings = settings.unwrap_or_default();
        let name = settings
            .name
            .unwrap_or_else(|| DEFAULT_ENTRY_NAME.to_string());
        if name.trim().is_empty() {
            return Err(AppError::BadAppName { app_name: name });
        }
        let automatic = settings.automatic_data_collection_enabled.unwrap_or(true);

        let mut apps = self.guard();
        if let Some(existing) = apps.get(&name) {
            if existing.options() == &options && existing.automatic_data_collection_enabled() == automatic {
                return Ok(existing.clone());
            }
            return Err(AppError::DuplicateApp { app_name: name });
        }

        let app = FirebaseApp::new(name.clone(), options, automatic);
        apps.insert(name, app.clone());
        Ok(app)
    }

    /// Looks up an app by name, defaulting to `[DEFAULT]`.
    pub fn get_app(&self, name: Option<&str>) -> AppResult<FirebaseApp> {
        let name = name.unwrap_or(DEFAULT_ENTRY_NAME);
        self.guard()
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NoApp {
                app_name: name.to_string(),
            })
    }

    pub fn delete_app(&self, app: &FirebaseApp) -> AppResult<()> {
        let removed = self.guard().remove(app.name());
        match removed {
            Some(stored) => {
                stored.set_is_deleted(true);
                Ok(())
            }
            None => Err(AppError::AppDeleted {
                app_name: app.name().to_string(),
            }),
        }
    }

    pub fn app_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.guard().keys().cloned().collect();
        names.sort();
        names
    }
}
