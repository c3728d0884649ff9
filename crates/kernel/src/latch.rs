//! Time-bounded latch behind [`Connector::once`].
//!
//! ```text
//!            truthy / emit true, arm timer
//!   ┌──────┐ ─────────────────────────────► ┌────────┐
//!   │ Idle │                                │ Active │ ◄─┐ truthy: no-op
//!   └──────┘ ◄───────────────────────────── └────────┘ ──┘
//!        falsy (cancel) or timer / emit false
//! ```
//!
//! A second trigger while active neither extends nor restarts the window;
//! at most one timer is outstanding. Without an interval the latch holds
//! until an explicit falsy input.

use std::sync::atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::connector::{Connector, WeakConnector};
use crate::error::{BoxError, KernelError};
use crate::value::{Value, is_truthy};

enum Phase {
    Idle,
    Active {
        generation: u64,
        timer: Option<JoinHandle<()>>,
    },
}

/// Phase plus the emissions it still owes the output, in transition order.
struct State {
    phase: Phase,
    pending: VecDeque<bool>,
    draining: bool,
}

struct Latch {
    interval: Option<Duration>,
    runtime: Handle,
    output: WeakConnector,
    state: Mutex<State>,
    generations: AtomicU64,
}

pub(crate) fn once(source: &Connector, interval: Option<Duration>) -> Result<Connector, KernelError> {
    let runtime = Handle::try_current().map_err(KernelError::NoRuntime)?;
    let output = Connector::new(format!("Once({})", source.name()));
    output.retain(source);

    let latch = Arc::new(Latch {
        interval,
        runtime,
        output: output.downgrade(),
        state: Mutex::new(State {
            phase: Phase::Idle,
            pending: VecDeque::new(),
            draining: false,
        }),
        generations: AtomicU64::new(0),
    });

    let commanded = Arc::clone(&latch);
    output.set_action(move |value: &Value| -> Result<(), BoxError> {
        commanded.input(is_truthy(value));
        Ok(())
    });

    source.on_set(move |value| latch.input(is_truthy(value)));

    Ok(output)
}

impl Latch {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn input(self: &Arc<Self>, truthy: bool) {
        let mut state = self.lock();
        let emit = match (std::mem::replace(&mut state.phase, Phase::Idle), truthy) {
            (active @ Phase::Active { .. }, true) => {
                state.phase = active;
                None
            }
            (Phase::Idle, true) => {
                let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                let timer = self.interval.map(|interval| self.arm(interval, generation));
                state.phase = Phase::Active { generation, timer };
                Some(true)
            }
            (Phase::Active { timer, .. }, false) => {
                if let Some(timer) = timer {
                    timer.abort();
                }
                Some(false)
            }
            (Phase::Idle, false) => Some(false),
        };
        if let Some(on) = emit {
            self.emit(state, on);
        }
    }

    fn arm(self: &Arc<Self>, interval: Duration, generation: u64) -> JoinHandle<()> {
        let latch = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            latch.expire(generation);
        })
    }

    fn expire(&self, generation: u64) {
        let mut state = self.lock();
        if matches!(state.phase, Phase::Active { generation: g, .. } if g == generation) {
            state.phase = Phase::Idle;
            tracing::debug!(generation, "latch window elapsed");
            self.emit(state, false);
        }
    }

    /// Queue `on` behind the emissions of earlier transitions, then apply
    /// the queue unless another caller is already applying it. The output is
    /// set without the lock held.
    fn emit<'a>(&'a self, mut state: MutexGuard<'a, State>, on: bool) {
        state.pending.push_back(on);
        if state.draining {
            return;
        }
        state.draining = true;
        loop {
            let Some(next) = state.pending.pop_front() else {
                state.draining = false;
                return;
            };
            drop(state);
            if let Some(output) = self.output.upgrade() {
                output.set(Value::Bool(next), false);
            }
            state = self.lock();
        }
    }
}
