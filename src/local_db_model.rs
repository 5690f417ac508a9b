//! Record definitions for the crime table.
//!
//! [`Crime`] is the in-memory entity handed to controllers and views.
//! [`CrimeRow`] is its wire-friendly encoding: the identifier as its canonical
//! string and the date as integer milliseconds since the Unix epoch. The
//! encoding is used both as the persisted LMDB value and as the JSON payload
//! exchanged over FFI.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_response::AppResponse;

/// A single case record.
///
/// Dates are kept at millisecond precision, the resolution of the persisted
/// encoding, so a record read back from the store compares equal to the one
/// that was written.
///
/// ```rust
/// use crime_record_core::local_db_model::Crime;
///
/// let crime = Crime::new();
/// assert!(crime.title.is_empty());
/// assert!(!crime.is_solved);
/// assert!(crime.suspect.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crime {
    /// Primary key. Assigned once in [`Crime::new`] and never reassigned.
    pub id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    pub is_solved: bool,
    pub suspect: String,
}

impl Crime {
    /// Builds a fresh record: new v4 identifier, empty title and suspect,
    /// unsolved, dated now.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            date: truncate_to_millis(Utc::now()),
            is_solved: false,
            suspect: String::new(),
        }
    }
}

impl Default for Crime {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops sub-millisecond precision so the value survives the integer encoding.
pub fn truncate_to_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    date.trunc_subsecs(3)
}

/// Persisted/wire encoding of a [`Crime`].
///
/// ```rust
/// use crime_record_core::local_db_model::{Crime, CrimeRow};
///
/// let crime = Crime::new();
/// let row = CrimeRow::from(&crime);
/// assert_eq!(row.id, crime.id.to_string());
/// assert_eq!(row.date, crime.date.timestamp_millis());
///
/// let decoded = Crime::try_from(row)?;
/// assert_eq!(decoded, crime);
/// # Ok::<(), crime_record_core::AppResponse>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrimeRow {
    /// Canonical hyphenated lowercase form of the identifier.
    pub id: String,
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub date: i64,
    pub is_solved: bool,
    #[serde(default)]
    pub suspect: String,
}

impl From<&Crime> for CrimeRow {
    fn from(crime: &Crime) -> Self {
        CrimeRow {
            id: encode_id(&crime.id),
            title: crime.title.clone(),
            date: encode_date(&crime.date),
            is_solved: crime.is_solved,
            suspect: crime.suspect.clone(),
        }
    }
}

impl TryFrom<CrimeRow> for Crime {
    type Error = AppResponse;

    fn try_from(row: CrimeRow) -> Result<Self, Self::Error> {
        Ok(Crime {
            id: decode_id(&row.id)?,
            title: row.title,
            date: decode_date(row.date)?,
            is_solved: row.is_solved,
            suspect: row.suspect,
        })
    }
}

pub fn encode_id(id: &Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn decode_id(raw: &str) -> Result<Uuid, AppResponse> {
    Uuid::parse_str(raw)
        .map_err(|e| AppResponse::DecodingError(format!("Invalid record id '{}': {}", raw, e)))
}

pub fn encode_date(date: &DateTime<Utc>) -> i64 {
    date.timestamp_millis()
}

pub fn decode_date(millis: i64) -> Result<DateTime<Utc>, AppResponse> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| AppResponse::DecodingError(format!("Date out of range: {} ms", millis)))
}

/// The LMDB value: a row plus its insertion sequence number.
///
/// `seq` is assigned on first insert and carried over on every overwrite, so
/// listing by `seq` yields insertion order regardless of key order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRow {
    pub seq: u64,
    #[serde(flatten)]
    pub row: CrimeRow,
}

impl StoredRow {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AppResponse> {
        serde_json::from_slice(bytes)
            .map_err(|e| AppResponse::DecodingError(format!("Malformed stored row: {}", e)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AppResponse> {
        Ok(serde_json::to_vec(self)?)
    }
}
