//! The window waker: prods a minimised host so its main loop ticks.
//!
//! On some host/OS combinations a minimised host window throttles or
//! halts the main loop, which would stall main-thread-lane requests
//! indefinitely. The waker restores the host window when work is
//! queued and re-minimises it after the drain has serviced at least
//! one request, so the window flickers visible only when strictly
//! necessary.
//!
//! On platforms without the OS hooks every operation is a no-op and
//! main-thread work simply waits for the next natural tick.

use std::sync::atomic::{AtomicBool, Ordering};

/// OS-level hook for waking and re-minimising the host window.
///
/// `wake_if_minimized` is called from reader threads when they enqueue
/// main-thread work; the remaining operations run on the host main
/// thread. Implementations must therefore be thread-safe.
pub trait WindowWaker: Send + Sync {
    /// Captures the host's top-level window handle. Idempotent across
    /// reloads.
    fn initialize(&self);

    /// If the host window is currently minimised: saves the current
    /// foreground window, restores the host window, and sets the
    /// sticky woken flag. Safe no-op otherwise.
    fn wake_if_minimized(&self);

    /// Returns the sticky woken flag.
    fn should_restore(&self) -> bool;

    /// Restores focus to the saved foreground window, re-minimises the
    /// host (best-effort), and clears the flag.
    ///
    /// If the user restored the window themselves mid-call the
    /// re-minimise still runs; the resulting flash is accepted rather
    /// than tracking user-initiated state changes.
    fn restore_minimized_state(&self);
}

/// Waker for platforms without window hooks: every operation is a
/// no-op and `should_restore` is always false.
#[derive(Debug, Default)]
pub struct NullWaker;

impl WindowWaker for NullWaker {
    fn initialize(&self) {}

    fn wake_if_minimized(&self) {}

    fn should_restore(&self) -> bool {
        false
    }

    fn restore_minimized_state(&self) {}
}

/// Returns the waker for the current platform.
#[must_use]
pub fn platform_waker() -> std::sync::Arc<dyn WindowWaker> {
    #[cfg(windows)]
    {
        std::sync::Arc::new(win32::Win32Waker::new())
    }
    #[cfg(not(windows))]
    {
        std::sync::Arc::new(NullWaker)
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod win32 {
    //! Win32 implementation: `IsIconic` / `ShowWindow` /
    //! `SetForegroundWindow`.

    use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

    use tracing::debug;
    use windows_sys::Win32::Foundation::HWND;
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        CloseWindow, GetForegroundWindow, IsIconic, SetForegroundWindow, ShowWindow, SW_MINIMIZE,
        SW_RESTORE,
    };

    use super::WindowWaker;

    /// Window waker backed by the Win32 window manager.
    #[derive(Debug, Default)]
    pub struct Win32Waker {
        /// The host's top-level window, captured at initialise time.
        host_window: AtomicIsize,
        /// Whatever had focus before we restored the host window.
        previous_focus: AtomicIsize,
        /// Sticky flag: the host window was woken by this subsystem.
        woken_by_us: AtomicBool,
    }

    impl Win32Waker {
        /// Creates an uninitialised waker.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                host_window: AtomicIsize::new(0),
                previous_focus: AtomicIsize::new(0),
                woken_by_us: AtomicBool::new(false),
            }
        }
    }

    impl WindowWaker for Win32Waker {
        fn initialize(&self) {
            // Called on the host main thread while the host window has
            // focus, so the foreground window is the host's top-level
            // window. Re-capturing on reload refreshes a stale handle.
            let hwnd = unsafe { GetForegroundWindow() };
            if !hwnd.is_null() {
                self.host_window.store(hwnd as isize, Ordering::SeqCst);
            }
        }

        fn wake_if_minimized(&self) {
            let hwnd = self.host_window.load(Ordering::SeqCst) as HWND;
            if hwnd.is_null() {
                return;
            }
            if unsafe { IsIconic(hwnd) } == 0 {
                return;
            }
            let focus = unsafe { GetForegroundWindow() };
            self.previous_focus.store(focus as isize, Ordering::SeqCst);
            unsafe { ShowWindow(hwnd, SW_RESTORE) };
            self.woken_by_us.store(true, Ordering::SeqCst);
            debug!("Restored minimised host window for main-thread work");
        }

        fn should_restore(&self) -> bool {
            self.woken_by_us.load(Ordering::SeqCst)
        }

        fn restore_minimized_state(&self) {
            let previous = self.previous_focus.swap(0, Ordering::SeqCst) as HWND;
            if !previous.is_null() {
                unsafe { SetForegroundWindow(previous) };
            }
            let hwnd = self.host_window.load(Ordering::SeqCst) as HWND;
            if !hwnd.is_null() {
                // Descending preference: ShowWindow, then CloseWindow
                // (which iconifies, despite the name).
                if unsafe { ShowWindow(hwnd, SW_MINIMIZE) } == 0 {
                    unsafe { CloseWindow(hwnd) };
                }
            }
            self.woken_by_us.store(false, Ordering::SeqCst);
            debug!("Re-minimised host window after drain");
        }
    }
}

/// Waker that tracks a simulated minimised window. Used by the agent
/// tests and by hosts that manage their own window state.
#[derive(Debug, Default)]
pub struct SimulatedWaker {
    minimized: AtomicBool,
    woken_by_us: AtomicBool,
    wake_count: std::sync::atomic::AtomicUsize,
    restore_count: std::sync::atomic::AtomicUsize,
}

impl SimulatedWaker {
    /// Creates a waker with the window in the given state.
    #[must_use]
    pub fn new(minimized: bool) -> Self {
        let waker = Self::default();
        waker.minimized.store(minimized, Ordering::SeqCst);
        waker
    }

    /// Whether the simulated window is currently minimised.
    #[must_use]
    pub fn is_minimized(&self) -> bool {
        self.minimized.load(Ordering::SeqCst)
    }

    /// Number of times the window was woken.
    #[must_use]
    pub fn wake_count(&self) -> usize {
        self.wake_count.load(Ordering::SeqCst)
    }

    /// Number of times the window was re-minimised.
    #[must_use]
    pub fn restore_count(&self) -> usize {
        self.restore_count.load(Ordering::SeqCst)
    }
}

impl WindowWaker for SimulatedWaker {
    fn initialize(&self) {}

    fn wake_if_minimized(&self) {
        if self.minimized.swap(false, Ordering::SeqCst) {
            self.woken_by_us.store(true, Ordering::SeqCst);
            self.wake_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn should_restore(&self) -> bool {
        self.woken_by_us.load(Ordering::SeqCst)
    }

    fn restore_minimized_state(&self) {
        self.minimized.store(true, Ordering::SeqCst);
        self.woken_by_us.store(false, Ordering::SeqCst);
        self.restore_count.fetch_add(1, Ordering::SeqCst);
    }
}
