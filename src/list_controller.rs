use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::app_response::AppResponse;
use crate::local_db_model::Crime;
use crate::query::Query;
use crate::repository::CrimeRepository;

/// Backs the crime list screen.
pub struct CrimeListController {
    repository: Arc<CrimeRepository>,
}

impl CrimeListController {
    pub fn new(repository: Arc<CrimeRepository>) -> Self {
        Self { repository }
    }

    pub fn observe_all(&self) -> Query<Vec<Crime>> {
        self.repository.get_all()
    }

    /// Persists a record with default fields and returns its id, ready to be
    /// loaded into a detail controller.
    pub fn create(&self) -> Result<Uuid, AppResponse> {
        let crime = Crime::new();
        self.repository.add(&crime)?;
        info!("Created crime {}", crime.id);
        Ok(crime.id)
    }
}
