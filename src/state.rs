use std::sync::Arc;

use crate::config::Config;
use crate::db::dbcolab::DbColab;
use crate::ws::capabilities::{AccessChecker, Authenticator, PresenceStore};
use crate::ws::registry::Registry;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub auth: Arc<dyn Authenticator>,
    pub access: Arc<dyn AccessChecker>,
    pub presence: Arc<dyn PresenceStore>,
    /// Present when the relay runs against Postgres.
    pub db: Option<Arc<DbColab>>,
}
