//! # Crime Record Core
//!
//! Local storage for crime case records, built on LMDB, with observable
//! queries and the screen controllers that sit between a mobile UI and the
//! store.
//!
//! ## Layers
//!
//! - [`local_db_state::AppDbState`] - the durable crime table and its change feed
//! - [`query::Query`] - live subscription that re-emits when the table changes
//! - [`repository::CrimeRepository`] - the one shared facade every controller receives
//! - [`list_controller::CrimeListController`] - list screen: observe all, create
//! - [`detail_controller::CrimeDetailController`] - detail screen: load, edit, commit
//! - [`report::crime_report`] - shareable case summary
//!
//! ## Quick Start
//!
//! ```no_run
//! use crime_record_core::detail_controller::CrimeDetailController;
//! use crime_record_core::list_controller::CrimeListController;
//! use crime_record_core::repository::CrimeRepository;
//!
//! # async fn run() -> Result<(), crime_record_core::AppResponse> {
//! let repository = CrimeRepository::open("crimes")?;
//! let list = CrimeListController::new(repository.clone());
//! let id = list.create()?;
//!
//! let mut detail = CrimeDetailController::new(repository);
//! let mut changes = detail.changes();
//! detail.load(id);
//! let _ = changes.changed().await;
//!
//! detail.set_title("Stolen bicycle");
//! detail.commit()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## FFI Functions
//!
//! Native hosts drive the repository through C-compatible functions that
//! exchange JSON-encoded [`local_db_model::CrimeRow`] values and return a
//! serialized [`AppResponse`]:
//!
//! - [`create_db`] - open a repository
//! - [`post_data`] - add a record (alias: `push_data`)
//! - [`put_data`] - save a record (alias: `update_data`)
//! - [`create_crime`] - create a record with default fields
//! - [`get_by_id`] - fetch one record
//! - [`get_all`] - fetch all records in insertion order
//! - [`crime_report_by_id`] - summary text for one record
//! - [`close_database`] - sync and release the repository
//!
//! ## Memory
//!
//! Every `*const c_char` these functions return is a heap-allocated,
//! null-terminated string handed over to the caller. The caller owns it and
//! must release it exactly once, on the Rust side via `CString::from_raw`.
//! A null return means the response itself could not be built.

pub mod detail_controller;
pub mod list_controller;
pub mod local_db_model;
pub mod local_db_state;
pub mod query;
pub mod report;
pub mod repository;
mod app_response;

pub use crate::app_response::AppResponse;

use crate::local_db_model::{decode_id, Crime, CrimeRow};
use crate::repository::CrimeRepository;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use log::{info, warn};

/// Opens (creating if needed) the repository stored in `<name>.lmdb`.
///
/// # Returns
///
/// A pointer to the repository, or null if the name is null, not UTF-8, or the
/// store cannot be opened. Release it with [`close_database`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use crime_record_core::create_db;
///
/// let name = CString::new("crimes").unwrap();
/// let repository = create_db(name.as_ptr());
/// assert!(!repository.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_db(name: *const c_char) -> *mut CrimeRepository {
    if name.is_null() {
        warn!("Null name pointer passed to create_db");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match local_db_state::AppDbState::init(name_str.to_string()) {
        Ok(state) => {
            info!("Crime store opened at {}", state.path());
            Box::into_raw(Box::new(CrimeRepository::with_state(state)))
        },
        Err(e) => {
            warn!("Failed to open crime store '{}': {}", name_str, e);
            std::ptr::null_mut()
        },
    }
}

/// Adds a record given as a JSON [`CrimeRow`].
///
/// ```json
/// {
///   "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
///   "title": "Broken window",
///   "date": 1700000000000,
///   "is_solved": false,
///   "suspect": ""
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn push_data(repository: *mut CrimeRepository, json_ptr: *const c_char) -> *const c_char {
    write_row(repository, json_ptr, "push_data", |repository, crime| repository.add(crime).map(|_| ()))
}

/// Alias for [`push_data`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn post_data(repository: *mut CrimeRepository, json_ptr: *const c_char) -> *const c_char {
    push_data(repository, json_ptr)
}

/// Saves a record given as a JSON [`CrimeRow`], overwriting every field of
/// the stored row or inserting it if absent.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_data(repository: *mut CrimeRepository, json_ptr: *const c_char) -> *const c_char {
    write_row(repository, json_ptr, "update_data", |repository, crime| repository.save(crime).map(|_| ()))
}

/// Alias for [`update_data`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn put_data(repository: *mut CrimeRepository, json_ptr: *const c_char) -> *const c_char {
    update_data(repository, json_ptr)
}

/// Creates a record with a fresh id and default fields and returns its row.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_crime(repository: *mut CrimeRepository) -> *const c_char {
    let repository = match unsafe { repository.as_ref() } {
        Some(r) => r,
        None => {
            let error = AppResponse::BadRequest("Null repository pointer passed to create_crime".to_string());
            return response_to_c_string(&error);
        }
    };

    let crime = Crime::new();
    match repository.add(&crime) {
        Ok(_) => row_response(&crime),
        Err(e) => response_to_c_string(&e),
    }
}

/// Retrieves one record by its id.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_by_id(repository: *mut CrimeRepository, id: *const c_char) -> *const c_char {
    let repository = match unsafe { repository.as_ref() } {
        Some(r) => r,
        None => {
            let error = AppResponse::BadRequest("Null repository pointer passed to get_by_id".to_string());
            return response_to_c_string(&error);
        }
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(error_ptr) => return error_ptr,
    };

    let id = match decode_id(&id_str) {
        Ok(id) => id,
        Err(e) => return response_to_c_string(&e),
    };

    match repository.get(id).current() {
        Ok(Some(crime)) => row_response(&crime),
        Ok(None) => {
            let error = AppResponse::NotFound(format!("No crime found with id: {id_str}"));
            response_to_c_string(&error)
        },
        Err(e) => response_to_c_string(&e),
    }
}

/// Retrieves all records, in insertion order.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all(repository: *mut CrimeRepository) -> *const c_char {
    let repository = match unsafe { repository.as_ref() } {
        Some(r) => r,
        None => {
            let error = AppResponse::BadRequest("Null repository pointer passed to get_all".to_string());
            return response_to_c_string(&error);
        }
    };

    match repository.get_all().current() {
        Ok(crimes) => {
            let rows: Vec<CrimeRow> = crimes.iter().map(CrimeRow::from).collect();
            match serde_json::to_string(&rows) {
                Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
                Err(e) => response_to_c_string(&AppResponse::from(e)),
            }
        },
        Err(e) => response_to_c_string(&e),
    }
}

/// Returns the shareable summary of one record.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn crime_report_by_id(repository: *mut CrimeRepository, id: *const c_char) -> *const c_char {
    let repository = match unsafe { repository.as_ref() } {
        Some(r) => r,
        None => {
            let error = AppResponse::BadRequest("Null repository pointer passed to crime_report_by_id".to_string());
            return response_to_c_string(&error);
        }
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(error_ptr) => return error_ptr,
    };

    let result = decode_id(&id_str).and_then(|id| repository.get(id).current());
    match result {
        Ok(Some(crime)) => response_to_c_string(&AppResponse::success(report::crime_report(&crime))),
        Ok(None) => response_to_c_string(&AppResponse::NotFound(format!("No crime found with id: {id_str}"))),
        Err(e) => response_to_c_string(&e),
    }
}

/// Syncs the store to disk and frees the repository.
///
/// The pointer must not be used after this call, whatever the outcome.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_database(repository: *mut CrimeRepository) -> *const c_char {
    if repository.is_null() {
        let error = AppResponse::BadRequest("Null repository pointer passed to close_database".to_string());
        return response_to_c_string(&error);
    }

    let repository = unsafe { Box::from_raw(repository) };
    match repository.close() {
        Ok(()) => response_to_c_string(&AppResponse::success("Database connection closed successfully")),
        Err(e) => response_to_c_string(&e),
    }
}

fn write_row(
    repository: *mut CrimeRepository,
    json_ptr: *const c_char,
    caller: &str,
    write: impl FnOnce(&CrimeRepository, &Crime) -> Result<(), AppResponse>,
) -> *const c_char {
    let repository = match unsafe { repository.as_ref() } {
        Some(r) => r,
        None => {
            let error = AppResponse::BadRequest(format!("Null repository pointer passed to {caller}"));
            return response_to_c_string(&error);
        }
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };

    let row: CrimeRow = match serde_json::from_str(&json_str) {
        Ok(row) => row,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    let crime = match Crime::try_from(row) {
        Ok(crime) => crime,
        Err(e) => return response_to_c_string(&e),
    };

    match write(repository, &crime) {
        Ok(()) => row_response(&crime),
        Err(e) => response_to_c_string(&e),
    }
}

fn row_response(crime: &Crime) -> *const c_char {
    match serde_json::to_string(&CrimeRow::from(crime)) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Failed to serialize crime: {e}"));
            response_to_c_string(&error)
        }
    }
}

/// Serializes the response into a C string owned by the caller.
///
/// # Returns
///
/// A pointer to a null-terminated JSON string, or null if serialization fails
/// or the JSON contains an interior NUL.
///
/// # Safety
///
/// The string is leaked with `CString::into_raw`. Ownership passes to the
/// FFI caller, who must free it exactly once through `CString::from_raw` and
/// must not free it with the C allocator.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a `String`, or an error response pointer
/// naming `field_name` when the pointer is null or not UTF-8.
///
/// # Safety
///
/// A non-null `ptr` must point to a valid null-terminated string that stays
/// alive for the duration of the call. The input is copied and stays owned by
/// the caller. An error pointer follows the ownership rules of
/// [`response_to_c_string`].
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
