//! Process-wide bookkeeping of active watches.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use notify::RecommendedWatcher;
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::ChangeSubscriber;
use crate::error::{MonitorError, Result};
use crate::watcher::{start_backend, Inbound, WatchOptions, WatchWorker, WorkerExit};

/// Identifies one registered watch. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of one active watch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchSummary {
    pub handle: WatchHandle,
    pub root: PathBuf,
    pub recursive: bool,
    pub started_at: SystemTime,
}

struct WatchContext {
    summary: WatchSummary,
    stopped: Arc<AtomicBool>,
    sender: Sender<Inbound>,
    backend: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl WatchContext {
    fn is_worker_thread(&self) -> bool {
        self.thread
            .as_ref()
            .map_or(false, |t| t.thread().id() == thread::current().id())
    }

    /// Stops further reporting and tears down the backend. Does not wait.
    fn signal_stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.backend.take();
        let _ = self.sender.send(Inbound::Stop);
    }

    fn join(mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!("Worker for {} panicked", self.summary.root.display());
        }
    }

    fn stop(mut self) {
        self.signal_stop();
        self.join();
    }
}

#[derive(Default)]
struct RegistryInner {
    contexts: Mutex<HashMap<WatchHandle, WatchContext>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl RegistryInner {
    fn take(&self, handle: WatchHandle) -> Option<WatchContext> {
        self.contexts.lock().remove(&handle)
    }
}

/// Owns every active watch. Dropping the registry stops them all.
///
/// Each watch runs on its own thread, which owns the watch's tree and calls
/// its subscriber. Subscribers must not call [`WatchRegistry::unregister`]
/// for their own watch; that is rejected with [`MonitorError::ReentrantStop`].
#[derive(Default)]
pub struct WatchRegistry {
    inner: Arc<RegistryInner>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts watching `root`.
    ///
    /// Returns once the initial discovery is done and its batch has been
    /// delivered. A root that cannot be scanned is reported here and nothing
    /// stays registered.
    pub fn register<S>(
        &self,
        root: impl AsRef<Path>,
        options: WatchOptions,
        subscriber: S,
    ) -> Result<WatchHandle>
    where
        S: ChangeSubscriber + 'static,
    {
        if self.is_closed() {
            return Err(MonitorError::RegistryClosed);
        }

        let requested = root.as_ref();
        let root = fs::canonicalize(requested).map_err(|err| MonitorError::from_io(requested, err))?;
        let handle = WatchHandle(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);

        let (sender, inbound) = mpsc::channel();
        let backend = start_backend(&root, options.recursive, sender.clone())?;
        let stopped = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = WatchWorker {
            handle,
            root: root.clone(),
            options: options.clone(),
            subscriber: Box::new(subscriber),
            inbound,
            stopped: Arc::clone(&stopped),
        };
        let registry = Arc::downgrade(&self.inner);

        // The worker removes itself from `contexts` if it fails. Holding the
        // lock until its context is inserted keeps that removal after the insert.
        {
            let mut contexts = self.inner.contexts.lock();
            if self.is_closed() {
                return Err(MonitorError::RegistryClosed);
            }

            let thread = thread::Builder::new()
                .name(format!("treewatch-{}", handle.0))
                .spawn(move || {
                    if worker.run(ready_tx) == WorkerExit::Failed {
                        if let Some(inner) = registry.upgrade() {
                            let context = inner.take(handle);
                            drop(context);
                        }
                    }
                })
                .map_err(|err| MonitorError::Backend(notify::Error::io(err)))?;

            contexts.insert(
                handle,
                WatchContext {
                    summary: WatchSummary {
                        handle,
                        root,
                        recursive: options.recursive,
                        started_at: SystemTime::now(),
                    },
                    stopped,
                    sender,
                    backend: Some(backend),
                    thread: Some(thread),
                },
            );
        }

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("Registered watch {} on {}", handle, requested.display());
                Ok(handle)
            }
            Ok(Err(err)) => {
                if let Some(context) = self.inner.take(handle) {
                    context.stop();
                }
                Err(err)
            }
            Err(_) => {
                // Worker exited without reporting, e.g. stopped by shutdown
                if let Some(context) = self.inner.take(handle) {
                    context.stop();
                }
                Err(MonitorError::Cancelled)
            }
        }
    }

    /// Stops a watch and waits for its worker to finish.
    ///
    /// Once this returns no further callbacks are made for `handle`.
    pub fn unregister(&self, handle: WatchHandle) -> Result<()> {
        let context = {
            let mut contexts = self.inner.contexts.lock();
            let reentrant = match contexts.get(&handle) {
                None => return Err(MonitorError::UnknownWatch(handle)),
                Some(context) => context.is_worker_thread(),
            };
            if reentrant {
                return Err(MonitorError::ReentrantStop);
            }
            contexts.remove(&handle)
        };

        if let Some(context) = context {
            tracing::info!("Unregistering watch {} on {}", handle, context.summary.root.display());
            context.stop();
        }
        Ok(())
    }

    /// Asks a watch to rescan its whole root and report the difference.
    pub fn request_resync(&self, handle: WatchHandle) -> Result<()> {
        let contexts = self.inner.contexts.lock();
        let context = contexts
            .get(&handle)
            .ok_or(MonitorError::UnknownWatch(handle))?;
        context
            .sender
            .send(Inbound::Resync)
            .map_err(|_| MonitorError::UnknownWatch(handle))
    }

    /// Active watches ordered by handle.
    pub fn active_contexts(&self) -> Vec<WatchSummary> {
        let mut summaries: Vec<_> = self
            .inner
            .contexts
            .lock()
            .values()
            .map(|context| context.summary.clone())
            .collect();
        summaries.sort_by_key(|summary| summary.handle);
        summaries
    }

    pub fn contains(&self, handle: WatchHandle) -> bool {
        self.inner.contexts.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.inner.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stops every watch and refuses new registrations. Safe to call twice.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut contexts: Vec<WatchContext> =
            self.inner.contexts.lock().drain().map(|(_, context)| context).collect();
        if contexts.is_empty() {
            return;
        }

        tracing::info!("Stopping {} watch(es)", contexts.len());
        for context in &mut contexts {
            context.signal_stop();
        }
        for context in contexts {
            context.join();
        }
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("active", &self.active_contexts())
            .field("closed", &self.is_closed())
            .finish()
    }
}
