use crate::db::connection::DbPool;
use crate::db::repositories::close_expired_groups;
use crate::welcome::{WelcomeState, new_state};
use chrono::Utc;
use tokio::time::{Duration, interval};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub welcome: WelcomeState,
}

impl AppState {
    pub fn new(db: DbPool) -> Self {
        // Out-of-band sweep: close groups whose voting deadline has passed.
        // Only ever moves a group from active to closed, so it can run
        // alongside vote submissions.
        let db_clone = db.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(60 * 60));
            loop {
                interval.tick().await;
                let today = Utc::now().date_naive();
                match close_expired_groups(&db_clone, today).await {
                    Ok(closed) if closed.is_empty() => {}
                    Ok(closed) => {
                        info!(
                            "{} groupe(s) de dates ont été fermé(s) automatiquement.",
                            closed.len()
                        );
                        for group in &closed {
                            info!("  - {} (fermeture: {})", group.title, group.vote_closing_date);
                        }
                    }
                    Err(e) => {
                        error!("closing sweep failed: {e}");
                    }
                }
            }
        });

        AppState {
            db,
            welcome: new_state(),
        }
    }
}
