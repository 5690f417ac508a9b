//! Observable reads over the crime table.
//!
//! A [`Query`] is a live subscription: it re-runs its read each time the
//! store commits a write and yields the result when it differs from the last
//! value it handed out. Dropping the query unsubscribes.

use std::sync::Arc;

use tokio::sync::watch;

use crate::app_response::AppResponse;
use crate::local_db_state::AppDbState;

type Fetch<T> = Box<dyn Fn(&AppDbState) -> Result<(u64, T), AppResponse> + Send + Sync>;

/// A value together with the store revision it was read at.
pub type Revisioned<T> = (u64, T);

pub struct Query<T> {
    state: Arc<AppDbState>,
    revisions: watch::Receiver<u64>,
    fetch: Fetch<T>,
    last: Option<T>,
    primed: bool,
}

impl<T> Query<T>
where
    T: Clone + PartialEq,
{
    pub(crate) fn new(
        state: Arc<AppDbState>,
        fetch: impl Fn(&AppDbState) -> Result<Revisioned<T>, AppResponse> + Send + Sync + 'static,
    ) -> Self {
        let revisions = state.subscribe();
        Self {
            state,
            revisions,
            fetch: Box::new(fetch),
            last: None,
            primed: false,
        }
    }

    /// Waits for the next distinct value.
    ///
    /// The first call resolves immediately with the current table contents.
    /// Read failures are yielded as `Err` and do not end the subscription.
    pub async fn next(&mut self) -> Result<T, AppResponse> {
        self.next_revisioned().await.map(|(_, value)| value)
    }

    /// Like [`Query::next`], also returning the revision the value was read
    /// at. Revisions of successive values strictly increase.
    pub async fn next_revisioned(&mut self) -> Result<Revisioned<T>, AppResponse> {
        loop {
            if self.primed && self.revisions.changed().await.is_err() {
                return Err(AppResponse::StorageError("Store closed".to_string()));
            }
            self.primed = true;
            // Mark the revision seen before reading so a write racing the
            // read still wakes the next call.
            self.revisions.borrow_and_update();

            match (self.fetch)(&self.state) {
                Ok((revision, value)) => {
                    if self.last.as_ref() == Some(&value) {
                        continue;
                    }
                    self.last = Some(value.clone());
                    return Ok((revision, value));
                }
                Err(e) => {
                    self.last = None;
                    return Err(e);
                }
            }
        }
    }

    /// One-shot read of the current value, outside the change stream.
    pub fn current(&self) -> Result<T, AppResponse> {
        (self.fetch)(&self.state).map(|(_, value)| value)
    }
}
