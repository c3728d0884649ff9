//! Ordered multi-stage gestures.
//!
//! A [`Sequencer`] watches a chain of connectors `[s0, s1, …, sN-1]` and
//! commands the last one once `s0 … sN-2` have pulsed truthy in order, e.g.
//! "press button A, then button B, then the scene fires".
//!
//! Only the stage under the cursor counts. A falsy value on that stage steps
//! back one stage (stage 0 stays put), so releasing a button before the next
//! one is pressed undoes the progress.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::connector::Connector;
use crate::error::KernelError;
use crate::value::{Value, is_truthy};

struct Progress {
    /// Number of gesture stages, i.e. controllers minus the terminal one.
    stages: usize,
    cursor: Mutex<usize>,
    terminal: Connector,
}

impl Progress {
    fn input(&self, stage: usize, value: &Value) {
        let completed = {
            let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            if stage != *cursor {
                return;
            }
            if is_truthy(value) {
                *cursor += 1;
            } else if stage > 0 {
                *cursor -= 1;
            }
            tracing::debug!(sequence = %self.terminal.name(), stage, cursor = *cursor, "sequence input");
            if *cursor == self.stages {
                *cursor = 0;
                true
            } else {
                false
            }
        };
        if completed {
            tracing::info!(sequence = %self.terminal.name(), "sequence completed");
            self.terminal.set(value.clone(), true);
        }
    }
}

/// Linear state machine over a chain of connectors.
///
/// The sequencer stops reacting once dropped.
pub struct Sequencer {
    controllers: Vec<Connector>,
    progress: Arc<Progress>,
}

impl Sequencer {
    /// Watch `controllers[..N-1]` and command `controllers[N-1]` on completion.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::SequenceTooShort`] with fewer than two controllers.
    pub fn new(controllers: Vec<Connector>) -> Result<Self, KernelError> {
        let Some((terminal, stages)) = controllers.split_last() else {
            return Err(KernelError::SequenceTooShort(0));
        };
        if stages.is_empty() {
            return Err(KernelError::SequenceTooShort(controllers.len()));
        }

        let progress = Arc::new(Progress {
            stages: stages.len(),
            cursor: Mutex::new(0),
            terminal: terminal.clone(),
        });
        for (stage, controller) in stages.iter().enumerate() {
            let progress: Weak<Progress> = Arc::downgrade(&progress);
            controller.on_set(move |value| {
                if let Some(progress) = progress.upgrade() {
                    progress.input(stage, value);
                }
            });
        }

        Ok(Self {
            controllers,
            progress,
        })
    }

    /// Index of the stage currently awaited.
    #[must_use]
    pub fn cursor(&self) -> usize {
        *self
            .progress
            .cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The watched chain, terminal controller last.
    #[must_use]
    pub fn controllers(&self) -> &[Connector] {
        &self.controllers
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.controllers.iter().map(Connector::name).collect();
        f.debug_struct("Sequencer")
            .field("controllers", &names)
            .field("cursor", &self.cursor())
            .finish()
    }
}
