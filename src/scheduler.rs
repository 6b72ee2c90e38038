/*!
The `scheduler` module provides the single background clock that drives realtime components: a
thread that wakes about once a millisecond and calls [`TickComponent::tick`] on everything
registered, in priority order. The thread starts lazily with the first registration and stops
when the last component unregisters.
!*/

use log::{debug, trace};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// The tick period. Components see millisecond timestamps, so there is nothing to gain from
/// waking more often.
const TICK_PERIOD: Duration = Duration::from_millis(1);

/// The capability of being driven by the scheduler. `tick` runs on the scheduler thread with a
/// monotonic millisecond timestamp whose origin is arbitrary.
pub trait TickComponent: Send {
    fn tick(&mut self, now_ms: u64);
}

/// Lower values tick first within one scheduler pass. The sequencer runs at
/// [`TickPriority::Sequencer`]; auxiliary components (metronomes, monitors) usually follow it.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum TickPriority {
    Sequencer = 0,
    Normal = 1,
    Low = 2,
}

/// A handle to a registered component, used to unregister it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TickHandle(u64);

struct Entry {
    id: u64,
    priority: TickPriority,
    component: Arc<Mutex<dyn TickComponent>>,
}

struct SchedulerInner {
    entries: Mutex<Vec<Entry>>,
    running: AtomicBool,
    next_id: AtomicU64,
    origin: Instant,
}

/// The tick scheduler. Cheap to clone; clones share the thread and the component list. Create
/// one per application and hand it to every sequencer.
#[derive(Clone)]
pub struct TickScheduler {
    inner: Arc<SchedulerInner>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                entries: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                origin: Instant::now(),
            }),
            thread: Arc::new(Mutex::new(None)),
        }
    }

    /// The scheduler's monotonic clock: milliseconds since an arbitrary origin. Monotonicity
    /// holds across suspend/resume because it is measured with [`Instant`].
    pub fn now_ms(&self) -> u64 {
        self.inner.origin.elapsed().as_millis() as u64
    }

    /// True while the background thread is alive.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Registers a component; the thread is spawned on the first registration. The component
    /// list is only mutated under its lock, which the thread also holds while ticking, so a
    /// tick pass always sees a coherent list.
    pub fn register(
        &self,
        priority: TickPriority,
        component: Arc<Mutex<dyn TickComponent>>,
    ) -> TickHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut entries = self.inner.entries.lock().expect("scheduler poisoned");
            entries.push(Entry {
                id,
                priority,
                component,
            });
            entries.sort_by_key(|e| e.priority);
        }
        self.start_thread();
        debug!("registered tick component {} at {:?}", id, priority);
        TickHandle(id)
    }

    /// Unregisters a component. When the last one goes, the thread is asked to stop and joined;
    /// any in-flight tick pass finishes first.
    pub fn unregister(&self, handle: TickHandle) {
        let now_empty = {
            let mut entries = self.inner.entries.lock().expect("scheduler poisoned");
            entries.retain(|e| e.id != handle.0);
            entries.is_empty()
        };
        debug!("unregistered tick component {}", handle.0);
        if now_empty {
            self.stop_thread();
        }
    }

    fn start_thread(&self) {
        let mut thread = self.thread.lock().expect("scheduler poisoned");
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *thread = Some(std::thread::spawn(move || {
            debug!("tick thread started");
            while inner.running.load(Ordering::SeqCst) {
                let now_ms = inner.origin.elapsed().as_millis() as u64;
                {
                    let entries = inner.entries.lock().expect("scheduler poisoned");
                    for entry in entries.iter() {
                        trace!("tick {} at {}", entry.id, now_ms);
                        if let Ok(mut component) = entry.component.lock() {
                            component.tick(now_ms);
                        }
                    }
                }
                std::thread::sleep(TICK_PERIOD);
            }
            debug!("tick thread stopped");
        }));
    }

    fn stop_thread(&self) {
        let handle = {
            let mut thread = self.thread.lock().expect("scheduler poisoned");
            if !self.inner.running.swap(false, Ordering::SeqCst) {
                return;
            }
            thread.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
