use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use cookie::Key;
use dashmap::DashMap;
use tracing::error;

use crate::config::GuardedRoute;
use crate::store::{Database, StoreError};
use crate::views::ViewRenderer;

use super::error::ApiError;

/// Session token -> (user id, expires_at).
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, (i64, Instant)>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn create(&self, user_id: i64) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let expires = Instant::now() + self.ttl;
        self.inner.insert(token.clone(), (user_id, expires));
        token
    }

    pub fn get(&self, token: &str) -> Option<i64> {
        let entry = self.inner.get(token)?;
        if entry.1 > Instant::now() {
            Some(entry.0)
        } else {
            drop(entry);
            self.inner.remove(token);
            None
        }
    }

    pub fn remove(&self, token: &str) {
        self.inner.remove(token);
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: SessionStore,
    pub cookie_key: Key,
    pub renderer: Arc<dyn ViewRenderer>,
    pub admin_only_routes: Arc<BTreeSet<GuardedRoute>>,
}

impl AppState {
    /// Run a blocking store call off the async runtime.
    pub async fn with_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|join_err| {
                error!(error = %join_err, "database task failed to complete");
                ApiError::Internal
            })?
            .map_err(ApiError::from)
    }

    pub fn is_admin_only(&self, route: GuardedRoute) -> bool {
        self.admin_only_routes.contains(&route)
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("sessions", &self.sessions)
            .field("renderer", &self.renderer)
            .field("admin_only_routes", &self.admin_only_routes)
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
