//! Single-flight initialization with generation tokens.
//!
//! Every init or restart is an attempt with a generation number. Concurrent
//! `init` callers join the in-flight attempt; a restart starts a new
//! generation, leaving the old attempt to finish on its own. The old
//! attempt's waiters still get its result, but it must check
//! [`Lifecycle::is_current`] before committing anything.

use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::watch;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    Ready { projects: usize },
    /// A newer attempt started before this one committed.
    Superseded,
    /// Initialization could not proceed; the session has no projects.
    Failed(String),
}

type OutcomeSlot = Option<InitOutcome>;

/// A handle for awaiting one attempt's outcome.
#[derive(Debug)]
pub struct Attempt {
    generation: u64,
    rx: watch::Receiver<OutcomeSlot>,
}

impl Attempt {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(mut self) -> InitOutcome {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                // the completion was dropped without reporting
                return InitOutcome::Superseded;
            }
        }
    }
}

/// Held by whoever runs the attempt; consumed by [`Lifecycle::complete`].
#[derive(Debug)]
pub struct Completion {
    generation: u64,
    tx: watch::Sender<OutcomeSlot>,
}

impl Completion {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub enum Begin {
    /// Already initialized; nothing to do.
    Ready(InitOutcome),
    /// An attempt is in flight; wait on it.
    Joined(Attempt),
    /// The caller must run this attempt and complete it.
    Started(Attempt, Completion),
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    generation: u64,
    current: Option<watch::Receiver<OutcomeSlot>>,
    last: Option<InitOutcome>,
}

#[derive(Debug)]
pub struct Lifecycle {
    inner: Mutex<Inner>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Uninitialized,
                generation: 0,
                current: None,
                last: None,
            }),
        }
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    pub fn begin_init(&self) -> Begin {
        let mut inner = self.lock();
        match inner.state {
            LifecycleState::Ready => Begin::Ready(
                inner
                    .last
                    .clone()
                    .unwrap_or(InitOutcome::Ready { projects: 0 }),
            ),
            LifecycleState::Initializing => {
                // a closed channel means the runner went away without reporting
                let joinable = inner
                    .current
                    .as_ref()
                    .filter(|rx| rx.has_changed().is_ok())
                    .cloned();
                match joinable {
                    Some(rx) => Begin::Joined(Attempt {
                        generation: inner.generation,
                        rx,
                    }),
                    None => {
                        let (attempt, completion) = Self::start(&mut inner);
                        Begin::Started(attempt, completion)
                    }
                }
            }
            LifecycleState::Uninitialized => {
                let (attempt, completion) = Self::start(&mut inner);
                Begin::Started(attempt, completion)
            }
        }
    }

    /// Start a new generation unconditionally, superseding any attempt in
    /// flight.
    pub fn begin_restart(&self) -> (Attempt, Completion) {
        let mut inner = self.lock();
        Self::start(&mut inner)
    }

    fn start(inner: &mut Inner) -> (Attempt, Completion) {
        inner.generation += 1;
        inner.state = LifecycleState::Initializing;

        let (tx, rx) = watch::channel(None);
        inner.current = Some(rx.clone());

        let generation = inner.generation;
        (Attempt { generation, rx }, Completion { generation, tx })
    }

    /// Report an attempt's outcome to its waiters. Only the current
    /// generation moves the state machine to `Ready`; returns whether it did.
    pub fn complete(&self, completion: Completion, outcome: InitOutcome) -> bool {
        let current = {
            let mut inner = self.lock();
            if inner.generation == completion.generation {
                inner.state = LifecycleState::Ready;
                inner.current = None;
                inner.last = Some(outcome.clone());
                true
            } else {
                tracing::debug!(
                    generation = completion.generation,
                    current = inner.generation,
                    "completing superseded attempt"
                );
                false
            }
        };
        completion.tx.send_replace(Some(outcome));
        current
    }
}
