//! Key monitor: hook lifecycle and serialized event delivery.
//!
//! The OS hook runs on its own delivery path (a CFRunLoop thread, a Win32
//! message loop, or an rdev listener thread). Captured events are marshalled
//! over a bounded channel into a single dispatch thread, so the registered
//! callback is always invoked from one logical sequence, in strict arrival
//! order, never concurrently with itself.

use crate::event::KeyEvent;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, warn};

/// `start` result code: monitor is running.
pub const START_OK: i32 = 0;
/// `start` result code: hook install rejected for a generic reason.
pub const START_FAILED: i32 = 2;
/// `start` result code: the OS reported a missing accessibility or
/// input-monitoring grant.
pub const START_PERMISSION_DENIED: i32 = 3;

/// Why a hook backend could not install.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("hook install failed: {0}")]
    Install(String),
}

/// An installed OS hook. Dropping the hook's event sender is part of the
/// stop contract: after `stop` returns the backend sends no further events.
pub trait KeyHook: Send {
    fn stop(self: Box<Self>);
}

/// Installs a platform key hook that feeds normalized events into `events`.
///
/// `install` must return synchronously once the hook is live (or rejected),
/// so the monitor can report permission denial to the caller.
pub trait HookBackend {
    fn install(&self, events: Sender<KeyEvent>) -> Result<Box<dyn KeyHook>, HookError>;
}

/// The single registered consumer callback.
pub type KeyCallback = Box<dyn FnMut(KeyEvent) + Send>;

thread_local! {
    static IN_DELIVERY: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread is inside a monitor callback invocation.
/// The capability layer uses this to refuse synchronous injection from the
/// delivery path.
pub fn in_event_delivery() -> bool {
    IN_DELIVERY.with(|flag| flag.get())
}

struct Running {
    hook: Option<Box<dyn KeyHook>>,
    stop_tx: Sender<()>,
    dispatch: Option<JoinHandle<()>>,
    /// Per-session callback slot, shared with this session's dispatch
    /// thread only. A dispatch thread that outlives its session can never
    /// touch a later session's callback.
    callback: Arc<Mutex<Option<KeyCallback>>>,
}

/// Process-wide key monitor. At most one hook per monitor; `start` while
/// running replaces the callback without reinstalling the hook.
pub struct KeyMonitor<B: HookBackend> {
    backend: B,
    running: Mutex<Option<Running>>,
}

impl<B: HookBackend> KeyMonitor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            running: Mutex::new(None),
        }
    }

    /// Install the hook and register `callback` as the sole consumer.
    ///
    /// Returns [`START_OK`] on success, [`START_PERMISSION_DENIED`] when the
    /// OS declined the hook for a missing grant, and another non-zero code
    /// for generic failure. Idempotent: when already running the callback is
    /// replaced atomically and the call returns [`START_OK`].
    pub fn start<F>(&self, callback: F) -> i32
    where
        F: FnMut(KeyEvent) + Send + 'static,
    {
        let mut running = self.running.lock().unwrap();
        if let Some(state) = running.as_ref() {
            *state.callback.lock().unwrap() = Some(Box::new(callback));
            debug!("monitor already running, callback replaced");
            return START_OK;
        }

        let (event_tx, event_rx) = bounded(1024);
        let (stop_tx, stop_rx) = bounded(1);

        let hook = match self.backend.install(event_tx) {
            Ok(hook) => hook,
            Err(HookError::PermissionDenied(reason)) => {
                warn!(%reason, "hook install denied by OS");
                return START_PERMISSION_DENIED;
            }
            Err(HookError::Install(reason)) => {
                warn!(%reason, "hook install failed");
                return START_FAILED;
            }
        };

        let callback: Arc<Mutex<Option<KeyCallback>>> =
            Arc::new(Mutex::new(Some(Box::new(callback))));

        let callback_slot = Arc::clone(&callback);
        let dispatch = thread::Builder::new()
            .name("autolib-dispatch".into())
            .spawn(move || dispatch_loop(event_rx, stop_rx, callback_slot));

        let dispatch = match dispatch {
            Ok(handle) => handle,
            Err(err) => {
                warn!(%err, "failed to spawn dispatch thread");
                hook.stop();
                return START_FAILED;
            }
        };

        *running = Some(Running {
            hook: Some(hook),
            stop_tx,
            dispatch: Some(dispatch),
            callback,
        });
        START_OK
    }

    /// Remove the hook and release monitor-owned resources. After `stop`
    /// returns, no further callback invocations occur. No-op when already
    /// stopped.
    ///
    /// Safe to call from inside the delivery callback: the in-flight
    /// invocation completes (stop returns into it), events still queued
    /// behind it are discarded, and the dispatch thread clears the callback
    /// on its way out instead of being joined.
    pub fn stop(&self) {
        let mut state = {
            let mut running = self.running.lock().unwrap();
            match running.take() {
                Some(state) => state,
                None => {
                    debug!("monitor already stopped");
                    return;
                }
            }
        };

        let _ = state.stop_tx.try_send(());
        if let Some(hook) = state.hook.take() {
            hook.stop();
        }
        if let Some(handle) = state.dispatch.take() {
            if thread::current().id() == handle.thread().id() {
                // stop() called from inside the callback; the dispatch
                // loop breaks on the queued stop signal before taking
                // another event and clears its own callback slot. Joining
                // here would deadlock.
                return;
            }
            let _ = handle.join();
        }
        *state.callback.lock().unwrap() = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }
}

impl<B: HookBackend> Drop for KeyMonitor<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(
    events: Receiver<KeyEvent>,
    stop: Receiver<()>,
    callback: Arc<Mutex<Option<KeyCallback>>>,
) {
    debug!("event dispatch loop started");
    loop {
        // A stop requested from inside the callback must win over events
        // that were already queued ahead of it.
        if stop.try_recv().is_ok() {
            break;
        }
        select! {
            recv(stop) -> _ => break,
            recv(events) -> msg => match msg {
                Ok(event) => {
                    let mut slot = callback.lock().unwrap();
                    if let Some(cb) = slot.as_mut() {
                        IN_DELIVERY.with(|flag| flag.set(true));
                        cb(event);
                        IN_DELIVERY.with(|flag| flag.set(false));
                    }
                }
                Err(_) => break,
            },
        }
    }
    *callback.lock().unwrap() = None;
    debug!("event dispatch loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type TxSlot = Arc<Mutex<Option<Sender<KeyEvent>>>>;

    struct FakeHook {
        tx_slot: TxSlot,
    }

    impl KeyHook for FakeHook {
        fn stop(self: Box<Self>) {
            // Dropping the sender mirrors a real backend shutting down.
            *self.tx_slot.lock().unwrap() = None;
        }
    }

    struct FakeBackend {
        tx_slot: TxSlot,
        installs: Arc<AtomicUsize>,
        deny: bool,
    }

    impl FakeBackend {
        fn new() -> (Self, TxSlot, Arc<AtomicUsize>) {
            let tx_slot: TxSlot = Arc::new(Mutex::new(None));
            let installs = Arc::new(AtomicUsize::new(0));
            let backend = Self {
                tx_slot: Arc::clone(&tx_slot),
                installs: Arc::clone(&installs),
                deny: false,
            };
            (backend, tx_slot, installs)
        }
    }

    impl HookBackend for FakeBackend {
        fn install(&self, events: Sender<KeyEvent>) -> Result<Box<dyn KeyHook>, HookError> {
            if self.deny {
                return Err(HookError::PermissionDenied(
                    "accessibility grant missing".into(),
                ));
            }
            self.installs.fetch_add(1, Ordering::SeqCst);
            *self.tx_slot.lock().unwrap() = Some(events);
            Ok(Box::new(FakeHook {
                tx_slot: Arc::clone(&self.tx_slot),
            }))
        }
    }

    fn event(key_code: u16) -> KeyEvent {
        KeyEvent {
            kind: KeyEventKind::Down,
            key_code,
            flags: 0,
            timestamp_ms: 0,
            is_repeat: false,
        }
    }

    fn inject(tx_slot: &TxSlot, ev: KeyEvent) {
        tx_slot
            .lock()
            .unwrap()
            .as_ref()
            .expect("hook not installed")
            .send(ev)
            .unwrap();
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached within timeout");
    }

    #[test]
    fn test_events_delivered_in_order() {
        let (backend, tx_slot, _) = FakeBackend::new();
        let monitor = KeyMonitor::new(backend);
        let seen: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        assert_eq!(monitor.start(move |ev| sink.lock().unwrap().push(ev.key_code)), START_OK);

        for code in 0..100u16 {
            inject(&tx_slot, event(code));
        }
        wait_until(|| seen.lock().unwrap().len() == 100);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100u16).collect::<Vec<_>>());
    }

    #[test]
    fn test_start_twice_replaces_callback_without_reinstall() {
        let (backend, tx_slot, installs) = FakeBackend::new();
        let monitor = KeyMonitor::new(backend);
        let first: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));
        let second: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        assert_eq!(monitor.start(move |ev| sink.lock().unwrap().push(ev.key_code)), START_OK);
        let sink = Arc::clone(&second);
        assert_eq!(monitor.start(move |ev| sink.lock().unwrap().push(ev.key_code)), START_OK);
        assert_eq!(installs.load(Ordering::SeqCst), 1);

        inject(&tx_slot, event(7));
        wait_until(|| second.lock().unwrap().len() == 1);
        assert!(first.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent_and_releases_hook() {
        let (backend, tx_slot, _) = FakeBackend::new();
        let monitor = KeyMonitor::new(backend);
        assert_eq!(monitor.start(|_| {}), START_OK);
        assert!(monitor.is_running());

        monitor.stop();
        assert!(!monitor.is_running());
        assert!(tx_slot.lock().unwrap().is_none());

        // Second stop is a no-op, not an error.
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_no_delivery_after_stop() {
        let (backend, tx_slot, _) = FakeBackend::new();
        let monitor = KeyMonitor::new(backend);
        let seen: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        monitor.start(move |ev| sink.lock().unwrap().push(ev.key_code));
        inject(&tx_slot, event(1));
        wait_until(|| seen.lock().unwrap().len() == 1);

        // Grab the sender before stop drops the hook's copy.
        let tx = tx_slot.lock().unwrap().clone().unwrap();
        monitor.stop();
        let _ = tx.send(event(2));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_permission_denied_returns_code_3_and_installs_no_hook() {
        let (mut backend, tx_slot, installs) = FakeBackend::new();
        backend.deny = true;
        let monitor = KeyMonitor::new(backend);

        assert_eq!(monitor.start(|_| {}), START_PERMISSION_DENIED);
        assert!(!monitor.is_running());
        assert_eq!(installs.load(Ordering::SeqCst), 0);
        assert!(tx_slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_restart_after_stop_delivers_again() {
        let (backend, tx_slot, installs) = FakeBackend::new();
        let monitor = KeyMonitor::new(backend);
        let seen: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        monitor.start(move |ev| sink.lock().unwrap().push(ev.key_code));
        inject(&tx_slot, event(1));
        wait_until(|| seen.lock().unwrap().len() == 1);
        monitor.stop();

        let sink = Arc::clone(&seen);
        assert_eq!(monitor.start(move |ev| sink.lock().unwrap().push(ev.key_code)), START_OK);
        assert_eq!(installs.load(Ordering::SeqCst), 2);
        inject(&tx_slot, event(2));
        wait_until(|| seen.lock().unwrap().len() == 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_stop_from_inside_callback_discards_queued_events() {
        let (backend, tx_slot, _) = FakeBackend::new();
        let monitor = Arc::new(KeyMonitor::new(backend));
        let seen: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let inner = Arc::clone(&monitor);
        monitor.start(move |ev| {
            sink.lock().unwrap().push(ev.key_code);
            inner.stop();
        });

        // Queue several events; the callback stops the monitor on the
        // first, so the rest must never be delivered.
        let tx = tx_slot.lock().unwrap().clone().unwrap();
        for code in 1..=3u16 {
            let _ = tx.send(event(code));
        }

        wait_until(|| !monitor.is_running());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        // A fresh session works normally afterwards.
        let sink = Arc::clone(&seen);
        assert_eq!(
            monitor.start(move |ev| sink.lock().unwrap().push(ev.key_code)),
            START_OK
        );
        inject(&tx_slot, event(9));
        wait_until(|| seen.lock().unwrap().len() == 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 9]);
    }

    #[test]
    fn test_delivery_flag_set_inside_callback() {
        let (backend, tx_slot, _) = FakeBackend::new();
        let monitor = KeyMonitor::new(backend);
        let flagged = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&flagged);
        monitor.start(move |_| {
            *sink.lock().unwrap() = Some(in_event_delivery());
        });
        inject(&tx_slot, event(1));
        wait_until(|| flagged.lock().unwrap().is_some());
        assert_eq!(*flagged.lock().unwrap(), Some(true));
        assert!(!in_event_delivery());
    }
}
