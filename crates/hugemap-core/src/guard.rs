//! Per-thread reentrancy guard for the interposed entry points.
//!
//! Our own code allocates (logging, hash-map growth, `dlsym`), and the
//! allocator may call `mmap`/`munmap`. Those nested calls land back in the
//! exported hooks on the same thread. While a guard is held they must go
//! straight to the real primitive: no classification, no tracker lock.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    // const-initialized and drop-free: no allocation, no TLS destructor.
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as executing inside a hook until dropped.
#[derive(Debug)]
pub struct HookGuard {
    // Tied to the thread that set the flag.
    _not_send: PhantomData<*const ()>,
}

impl HookGuard {
    /// Enter the hook, or `None` if this thread is already inside one.
    ///
    /// During thread teardown the flag may be unavailable; that is treated
    /// as reentrant so the call is delegated untouched.
    pub fn enter() -> Option<Self> {
        IN_HOOK
            .try_with(|flag| {
                if flag.get() {
                    None
                } else {
                    flag.set(true);
                    Some(Self { _not_send: PhantomData })
                }
            })
            .ok()
            .flatten()
    }

    /// Whether the current thread currently holds a guard.
    pub fn is_active() -> bool {
        IN_HOOK.try_with(Cell::get).unwrap_or(true)
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = IN_HOOK.try_with(|flag| flag.set(false));
    }
}
