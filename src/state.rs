use crate::config::Config;
use crate::error::AppError;
use crate::utils::google::GoogleVerifier;
use axum::extract::FromRef;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub google: GoogleVerifier,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Result<Self, AppError> {
        let google = GoogleVerifier::new(&config)?;
        Ok(Self { pool, config, google })
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for GoogleVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.google.clone()
    }
}
