//! C-linkage callback ABI for instrumentation front-ends (§6.1, §6.2).
//!
//! Ordinary event callbacks (`func_entry`, `before_store`, `detach`, ...)
//! carry no explicit view pointer; they operate implicitly on whichever
//! [`ShadowStack`] is registered for the calling thread. The reducer hooks
//! (`identity`, `reduce`) are the exception: the runtime hands them
//! explicit, arbitrary storage at migration boundaries, since a
//! hyperobject view can outlive the thread that created it.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use libc::{c_char, c_void};

use racedet_core::{report, track_reads, Address, Phase, ReduceStrategy, ShadowStack};

/// Identifies a worker's registered view in the thread-local registry, for
/// diagnostics only; the core engine never reads it (§3 "WorkerId").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerId(u64);

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // The calling thread's registered view, if `init` has been called on
    // it. `None` before `init` or after the worker has torn down.
    static CURRENT: RefCell<Option<(WorkerId, ShadowStack)>> = RefCell::new(None);
}

fn with_current<R>(f: impl FnOnce(&mut ShadowStack) -> R) -> Option<R> {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_mut() {
            Some((_, stack)) => Some(f(stack)),
            None => {
                log::error!("racedet: callback fired on a thread with no registered worker");
                None
            }
        }
    })
}

/// Run `outcome` through the global report sink, tagged with `phase`, if
/// the callback that produced it actually ran. A sink write failure is
/// logged and otherwise ignored: there is no channel to propagate it
/// further across the `extern "C"` boundary (§7).
fn report_outcome(phase: Phase, outcome: Option<racedet_core::RaceOutcome>) {
    if let Some(outcome) = outcome {
        if let Err(e) = report(phase, &outcome) {
            log::error!("racedet: failed to write race report: {e}");
        }
    }
}

// ---------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------

/// Process-wide setup hook. A no-op beyond initializing the logger so
/// that `log::warn!`/`log::error!` calls from elsewhere in the crate have
/// somewhere to go when the host application hasn't configured one.
#[no_mangle]
pub extern "C" fn unit_init(_file: *const c_char, _counts: u64) {
    let _ = env_logger::try_init();
}

/// Per-worker setup hook: registers a fresh root [`ShadowStack`] for the
/// calling thread.
#[no_mangle]
pub extern "C" fn init() {
    let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
    log::debug!("racedet: worker {} registered", id.0);
    CURRENT.with(|cell| {
        *cell.borrow_mut() = Some((id, ShadowStack::new_root()));
    });
}

// ---------------------------------------------------------------------
// Function entry/exit
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn func_entry(_func_id: u64, _props: u64) {
    with_current(|s| s.push_task());
}

#[no_mangle]
pub extern "C" fn func_exit(_exit_id: u64, _func_id: u64, _props: u64) {
    let outcome = with_current(|s| s.func_exit());
    match outcome {
        Some(Ok(outcome)) => report_outcome(Phase::Join, Some(outcome)),
        Some(Err(e)) => e.abort(),
        None => {}
    }
}

// ---------------------------------------------------------------------
// Memory accesses
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn before_store(_store_id: u64, addr: u64, _nbytes: u64, _props: u64) {
    with_current(|s| s.register_write(Address::new(addr)));
}

#[no_mangle]
pub extern "C" fn after_store(_store_id: u64, _addr: u64, _nbytes: u64, _props: u64) {}

#[no_mangle]
pub extern "C" fn before_load(_load_id: u64, addr: u64, _nbytes: u64, _props: u64) {
    if track_reads() {
        with_current(|s| s.register_read(Address::new(addr)));
    }
}

#[no_mangle]
pub extern "C" fn after_load(_load_id: u64, _addr: u64, _nbytes: u64, _props: u64) {}

// ---------------------------------------------------------------------
// Fork/join
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn detach(_detach_id: u64, sync_reg: u32, _props: u64) {
    with_current(|s| s.detach(sync_reg));
}

#[no_mangle]
pub extern "C" fn detach_continue(_continue_id: u64, _detach_id: u64, sync_reg: u32, _props: u64) {
    with_current(|s| s.push_continue(sync_reg));
}

#[no_mangle]
pub extern "C" fn task(_task_id: u64, _detach_id: u64, _props: u64) {}

#[no_mangle]
pub extern "C" fn task_exit(
    _exit_id: u64,
    _task_id: u64,
    _detach_id: u64,
    _sync_reg: u32,
    _props: u64,
) {
    let outcome = with_current(|s| s.task_exit());
    match outcome {
        Some(Some(Ok(outcome))) => report_outcome(Phase::Join, Some(outcome)),
        Some(Some(Err(e))) => e.abort(),
        Some(None) | None => {}
    }
}

#[no_mangle]
pub extern "C" fn before_sync(_sync_id: u64, _sync_reg: u32) {}

#[no_mangle]
pub extern "C" fn after_sync(_sync_id: u64, sync_reg: u32) {
    let outcome = with_current(|s| s.enter_serial(sync_reg));
    report_outcome(Phase::Sync, outcome);
}

#[no_mangle]
pub extern "C" fn after_alloca(_alloca_id: u64, addr: u64, nbytes: u64, _props: u64) {
    with_current(|s| s.record_alloca(Address::new(addr), nbytes));
}

// ---------------------------------------------------------------------
// Reducer hooks (§6.2): operate on explicit runtime-owned storage, not
// the thread-local registry above.
// ---------------------------------------------------------------------

/// # Safety
/// `view` must point to storage at least as large and as aligned as
/// `ShadowStack`, valid for writes, and not currently holding a live
/// `ShadowStack` (this call overwrites it without dropping any prior
/// contents, mirroring the runtime's placement-construction contract).
#[no_mangle]
pub unsafe extern "C" fn identity(view: *mut c_void) {
    std::ptr::write(view as *mut ShadowStack, ShadowStack::identity());
}

/// # Safety
/// `left` must point to a live, initialized `ShadowStack`. `right` must
/// point to a live, initialized `ShadowStack` that this call consumes:
/// its bytes are logically moved out and must not be read, dropped, or
/// reduced again afterwards.
#[no_mangle]
pub unsafe extern "C" fn reduce(left: *mut c_void, right: *mut c_void) {
    let left_stack = &mut *(left as *mut ShadowStack);
    let right_stack = std::ptr::read(right as *mut ShadowStack);
    match left_stack.reduce(right_stack, ReduceStrategy::Concatenate) {
        Ok(outcome) => report_outcome(Phase::Reduce, outcome),
        Err(e) => e.abort(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset() {
        CURRENT.with(|cell| *cell.borrow_mut() = None);
    }

    #[test]
    fn callbacks_before_init_log_and_do_not_panic() {
        reset();
        func_entry(0, 0);
        reset();
    }

    #[test]
    fn init_registers_a_fresh_worker() {
        reset();
        init();
        let depth = with_current(|s| s.depth());
        assert_eq!(depth, Some(1));
        // drain back to the registered root so the thread-local's Drop
        // at thread exit doesn't see an unbalanced stack from this test
        reset();
    }

    #[test]
    fn func_entry_exit_round_trips_cleanly() {
        reset();
        init();
        func_entry(1, 0);
        before_store(0, 0x10, 8, 0);
        func_exit(0, 1, 0);
        let depth = with_current(|s| s.depth());
        assert_eq!(depth, Some(1));
        reset();
    }
}
