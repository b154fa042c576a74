//! C FFI bindings for hostctx stores
//!
//! This module provides a C-compatible API so runtimes with their own
//! memory manager can own stores through opaque pointers:
//! - ABI-stable (uses only C-compatible types)
//! - Error handling via out-parameters
//! - Host data is an opaque pointer plus an optional release callback,
//!   invoked exactly once when the store's registry record goes away
//! - Explicit `hostctx_store_close` and finalizer-driven
//!   `hostctx_store_delete` share one idempotent teardown
//!
//! A store is not safe to enter from two threads at once; serializing calls
//! on one store is the caller's obligation.

use hostctx_core::{Engine, EngineConfig, EngineError, StoreError, StoreWithData};
use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to an engine
#[repr(C)]
pub struct HostctxEngine {
    _private: [u8; 0],
}

/// Opaque handle to a store
#[repr(C)]
pub struct HostctxStore {
    _private: [u8; 0],
}

/// Error information
#[repr(C)]
pub struct HostctxError {
    message: *mut c_char,
}

/// Callback releasing host data once the store no longer references it
pub type HostctxFinalizer = Option<unsafe extern "C" fn(data: *mut c_void)>;

// Internal representation of an engine (not exposed to C)
struct EngineHandle {
    engine: Engine,
}

// Internal representation of a store (not exposed to C)
struct StoreHandle {
    store: StoreWithData<HostData>,
}

/// Host data pointer registered for a store
struct HostData {
    ptr: *mut c_void,
    finalizer: HostctxFinalizer,
}

// The host owns the pointee and promises it may be released from any thread
unsafe impl Send for HostData {}
unsafe impl Sync for HostData {}

impl Drop for HostData {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer {
            unsafe { finalizer(self.ptr) };
        }
    }
}

/// Errors surfaced through the C API
#[derive(Debug, thiserror::Error)]
enum FfiError {
    /// A required pointer argument was NULL
    #[error("invalid argument: {0} is null")]
    NullPointer(&'static str),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert Rust string to C string (caller must free)
fn rust_to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Set error out-parameter
unsafe fn set_error(error_out: *mut *mut HostctxError, error: FfiError) {
    tracing::debug!(%error, "reporting error through C API");
    if !error_out.is_null() {
        let message = rust_to_c_string(&error.to_string());
        *error_out = Box::into_raw(Box::new(HostctxError { message }));
    }
}

/// Translate a fallible result into the C status convention
unsafe fn status(result: Result<(), FfiError>, error: *mut *mut HostctxError) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_error(error, e);
            -1
        }
    }
}

unsafe fn store_mut<'a>(store: *mut HostctxStore) -> Result<&'a mut StoreHandle, FfiError> {
    if store.is_null() {
        return Err(FfiError::NullPointer("store"));
    }
    Ok(&mut *(store as *mut StoreHandle))
}

// ============================================================================
// Engine Functions
// ============================================================================

/// Create an engine with the default configuration
///
/// # Safety
/// The returned engine must be freed with `hostctx_engine_delete()`
#[no_mangle]
pub unsafe extern "C" fn hostctx_engine_new() -> *mut HostctxEngine {
    let handle = Box::new(EngineHandle {
        engine: Engine::default(),
    });
    Box::into_raw(handle) as *mut HostctxEngine
}

/// Create an engine with fuel accounting and/or epoch interruption
///
/// # Arguments
/// * `consume_fuel` - Non-zero to enable fuel accounting
/// * `epoch_interruption` - Non-zero to enable epoch deadlines
/// * `error` - Optional pointer to receive error information
///
/// # Returns
/// * Non-null pointer on success
/// * NULL on failure (check error parameter)
///
/// # Safety
/// The returned engine must be freed with `hostctx_engine_delete()`
#[no_mangle]
pub unsafe extern "C" fn hostctx_engine_new_with_config(
    consume_fuel: c_int,
    epoch_interruption: c_int,
    error: *mut *mut HostctxError,
) -> *mut HostctxEngine {
    let config = EngineConfig {
        consume_fuel: consume_fuel != 0,
        epoch_interruption: epoch_interruption != 0,
        ..Default::default()
    };

    match Engine::new(config) {
        Ok(engine) => Box::into_raw(Box::new(EngineHandle { engine })) as *mut HostctxEngine,
        Err(e) => {
            set_error(error, e.into());
            ptr::null_mut()
        }
    }
}

/// Advance the engine epoch by one tick
///
/// # Safety
/// Engine pointer must be valid; may be called from any thread
#[no_mangle]
pub unsafe extern "C" fn hostctx_engine_increment_epoch(engine: *const HostctxEngine) {
    if engine.is_null() {
        return;
    }
    (*(engine as *const EngineHandle)).engine.increment_epoch();
}

/// Release the caller's reference to an engine
///
/// Stores created from the engine keep it alive until they are closed.
///
/// # Safety
/// - Engine pointer must have been returned by `hostctx_engine_new*()`
/// - Engine pointer must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn hostctx_engine_delete(engine: *mut HostctxEngine) {
    if engine.is_null() {
        return;
    }
    drop(Box::from_raw(engine as *mut EngineHandle));
}

// ============================================================================
// Store Lifecycle Functions
// ============================================================================

/// Create a store holding `data`
///
/// # Arguments
/// * `engine` - Engine to create the store on (must not be NULL)
/// * `data` - Opaque host pointer returned by `hostctx_store_data()`
/// * `finalizer` - Optional callback invoked once with `data` after teardown
/// * `error` - Optional pointer to receive error information
///
/// # Returns
/// * Non-null pointer on success
/// * NULL on failure (check error parameter); `finalizer` has then already
///   been invoked
///
/// # Safety
/// The returned store must be freed with `hostctx_store_delete()`
///
/// # Example (C)
/// ```c
/// HostctxError* error = NULL;
/// HostctxStore* store = hostctx_store_new(engine, state, release_state, &error);
/// if (store == NULL) {
///     fprintf(stderr, "store: %s\n", hostctx_error_message(error));
///     hostctx_error_free(error);
///     return 1;
/// }
/// // Use store...
/// hostctx_store_close(store, NULL);
/// hostctx_store_delete(store);
/// ```
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_new(
    engine: *const HostctxEngine,
    data: *mut c_void,
    finalizer: HostctxFinalizer,
    error: *mut *mut HostctxError,
) -> *mut HostctxStore {
    let data = HostData {
        ptr: data,
        finalizer,
    };

    if engine.is_null() {
        set_error(error, FfiError::NullPointer("engine"));
        return ptr::null_mut();
    }
    let engine = &(*(engine as *const EngineHandle)).engine;

    match StoreWithData::new(engine, data) {
        Ok(store) => Box::into_raw(Box::new(StoreHandle { store })) as *mut HostctxStore,
        Err(e) => {
            set_error(error, e.into());
            ptr::null_mut()
        }
    }
}

/// Tear down the store's native context and registry record
///
/// Idempotent: closing an already-closed store succeeds and does nothing.
///
/// # Returns
/// * 0 on success
/// * -1 on failure (check error parameter)
///
/// # Safety
/// Store pointer must be valid (created by `hostctx_store_new()`)
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_close(
    store: *mut HostctxStore,
    error: *mut *mut HostctxError,
) -> c_int {
    let result = store_mut(store).and_then(|handle| Ok(handle.store.close()?));
    status(result, error)
}

/// Free a store handle, closing it first if needed
///
/// Intended to be called from the host's finalizer.
///
/// # Safety
/// - Store pointer must be valid (created by `hostctx_store_new()`)
/// - Store must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_delete(store: *mut HostctxStore) {
    if store.is_null() {
        return;
    }

    let mut handle = Box::from_raw(store as *mut StoreHandle);
    if let Err(e) = handle.store.close() {
        tracing::error!(error = %e, "store teardown failed in finalizer");
        std::process::abort();
    }
}

// ============================================================================
// Store Accessors
// ============================================================================

/// Get the host data pointer bound to the store
///
/// # Returns
/// * The pointer passed to `hostctx_store_new()`
/// * NULL if the store is NULL or closed
///
/// # Safety
/// Store pointer must be valid
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_data(store: *const HostctxStore) -> *mut c_void {
    if store.is_null() {
        return ptr::null_mut();
    }

    let handle = &*(store as *const StoreHandle);
    match handle.store.data() {
        Ok(data) => data.ptr,
        Err(_) => ptr::null_mut(),
    }
}

/// Get the registry index of the store
///
/// # Returns
/// * The index (non-negative)
/// * -1 if the store is NULL or closed
///
/// # Safety
/// Store pointer must be valid
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_index(store: *const HostctxStore) -> i64 {
    if store.is_null() {
        return -1;
    }

    let handle = &*(store as *const StoreHandle);
    handle
        .store
        .index()
        .map(|index| i64::from(index.as_u32()))
        .unwrap_or(-1)
}

/// Set the store's remaining fuel
///
/// Fails if the engine was created without fuel accounting.
///
/// # Safety
/// Store pointer must be valid
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_set_fuel(
    store: *mut HostctxStore,
    fuel: u64,
    error: *mut *mut HostctxError,
) -> c_int {
    let result = store_mut(store).and_then(|handle| Ok(handle.store.set_fuel(fuel)?));
    status(result, error)
}

/// Read the store's remaining fuel into `fuel_out`
///
/// Fails if the engine was created without fuel accounting.
///
/// # Safety
/// - Store pointer must be valid
/// - `fuel_out` must be a valid pointer to a u64
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_get_fuel(
    store: *mut HostctxStore,
    fuel_out: *mut u64,
    error: *mut *mut HostctxError,
) -> c_int {
    let result = store_mut(store).and_then(|handle| {
        if fuel_out.is_null() {
            return Err(FfiError::NullPointer("fuel_out"));
        }
        *fuel_out = handle.store.get_fuel()?;
        Ok(())
    });
    status(result, error)
}

/// Trap running code after `ticks` further epoch increments
///
/// Fails if the engine was created without epoch interruption.
///
/// # Safety
/// Store pointer must be valid
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_set_epoch_deadline(
    store: *mut HostctxStore,
    ticks: u64,
    error: *mut *mut HostctxError,
) -> c_int {
    let result = store_mut(store).and_then(|handle| Ok(handle.store.set_epoch_deadline(ticks)?));
    status(result, error)
}

/// Install resource limits; pass a negative value for "no limit"
///
/// # Safety
/// Store pointer must be valid
#[no_mangle]
pub unsafe extern "C" fn hostctx_store_limiter(
    store: *mut HostctxStore,
    max_memory_bytes: i64,
    max_table_elements: i64,
    max_instances: i64,
    max_tables: i64,
    max_memories: i64,
    error: *mut *mut HostctxError,
) -> c_int {
    let result = store_mut(store).and_then(|handle| {
        Ok(handle.store.limiter(
            max_memory_bytes,
            max_table_elements,
            max_instances,
            max_tables,
            max_memories,
        )?)
    });
    status(result, error)
}

// ============================================================================
// Error Handling Functions
// ============================================================================

/// Get the error message
///
/// # Safety
/// - Error pointer must be valid
/// - Returned string is valid until `hostctx_error_free()` is called
/// - Do not free the returned string directly
#[no_mangle]
pub unsafe extern "C" fn hostctx_error_message(error: *const HostctxError) -> *const c_char {
    if error.is_null() {
        return ptr::null();
    }

    (*error).message
}

/// Free an error
///
/// # Safety
/// - Error pointer must be valid (created by the hostctx API)
/// - Error must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn hostctx_error_free(error: *mut HostctxError) {
    if error.is_null() {
        return;
    }

    if !(*error).message.is_null() {
        drop(CString::from_raw((*error).message));
    }
    drop(Box::from_raw(error));
}

/// Get the library version string
///
/// # Safety
/// The returned string is static and must not be freed
#[no_mangle]
pub unsafe extern "C" fn hostctx_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================
