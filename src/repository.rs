use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::app_response::AppResponse;
use crate::local_db_model::Crime;
use crate::local_db_state::AppDbState;
use crate::query::Query;

/// Facade over the crime store.
///
/// Construct one per process with [`CrimeRepository::open`] and hand the same
/// `Arc` to every controller. Reads always go through the store; nothing is
/// mirrored here.
pub struct CrimeRepository {
    state: Arc<AppDbState>,
}

impl CrimeRepository {
    pub fn open(name: impl Into<String>) -> Result<Arc<Self>, AppResponse> {
        let state = AppDbState::init(name.into())?;
        info!("Crime repository ready at {}", state.path());
        Ok(Arc::new(Self::with_state(state)))
    }

    pub fn with_state(state: AppDbState) -> Self {
        Self { state: Arc::new(state) }
    }

    pub fn get_all(&self) -> Query<Vec<Crime>> {
        self.state.list_all()
    }

    pub fn get(&self, id: Uuid) -> Query<Option<Crime>> {
        self.state.find_by_id(id)
    }

    /// Both writes return the store revision they committed at.
    pub fn add(&self, crime: &Crime) -> Result<u64, AppResponse> {
        self.state.upsert(crime)
    }

    pub fn save(&self, crime: &Crime) -> Result<u64, AppResponse> {
        self.state.upsert(crime)
    }

    pub fn close(&self) -> Result<(), AppResponse> {
        self.state.close_database()
    }
}
