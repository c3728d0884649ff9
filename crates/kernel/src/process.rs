//! Supervised external processes as line streams.
//!
//! A [`ProcessSource`] keeps a shell command alive (e.g.
//! `mosquitto_sub -t '#' -v` or `nc -u bridge 30007`) and pushes every
//! non-empty, trimmed line of its standard output into a root
//! [`FilterNode`]. Whatever happens to the process (crash, clean exit, read
//! error, failure to spawn) it is restarted after a fixed backoff, until
//! [`ProcessSource::stop`] is called.
//!
//! The reader task is the only writer into its filter tree, and callbacks
//! run inline on it: the next line is not read before the previous one has
//! been fully propagated, side effects included.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::KernelError;
use crate::filter::FilterNode;

/// Delay between a process ending and its restart.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

struct Run {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// A long-running shell command whose output feeds a filter tree.
pub struct ProcessSource {
    command: String,
    label: String,
    shell: String,
    backoff: Duration,
    root: FilterNode,
    run: Mutex<Option<Run>>,
}

impl ProcessSource {
    /// Describe a source for `command`; nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            label: command.clone(),
            command,
            shell: "sh".to_string(),
            backoff: DEFAULT_BACKOFF,
            root: FilterNode::root(),
            run: Mutex::new(None),
        }
    }

    /// Override the restart delay.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run the command through another shell (invoked as `<shell> -c <command>`).
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Name used in logs instead of the command line, which may carry
    /// credentials.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The command line.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Root of the filter tree; every output line reaches it.
    #[must_use]
    pub fn root(&self) -> &FilterNode {
        &self.root
    }

    /// Shorthand for `root().filter(pattern)`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Pattern`] if `pattern` is not a valid regex.
    pub fn filter(&self, pattern: &str) -> Result<FilterNode, KernelError> {
        self.root.filter(pattern)
    }

    /// Whether the source is meant to be running (it may be in backoff).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_run().is_some()
    }

    /// Launch the reader loop. No-op if already running.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NoRuntime`] when called outside a tokio runtime.
    pub fn start(&self) -> Result<(), KernelError> {
        let mut run = self.lock_run();
        if run.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(KernelError::NoRuntime)?;
        let (stop, stopped) = watch::channel(false);
        let reader = Reader {
            command: self.command.clone(),
            label: self.label.clone(),
            shell: self.shell.clone(),
            backoff: self.backoff,
            root: self.root.clone(),
            stopped,
        };
        tracing::info!(source = %self.label, "starting process source");
        *run = Some(Run {
            stop,
            task: runtime.spawn(reader.run()),
        });
        Ok(())
    }

    /// Stop the reader loop and kill the process; no restart follows.
    pub fn stop(&self) {
        if let Some(run) = self.lock_run().take() {
            tracing::info!(source = %self.label, "stopping process source");
            run.stop.send_replace(true);
            drop(run.task);
        }
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ProcessSource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Reader {
    command: String,
    label: String,
    shell: String,
    backoff: Duration,
    root: FilterNode,
    stopped: watch::Receiver<bool>,
}

impl Reader {
    async fn run(mut self) {
        while !self.is_stopped() {
            match self.run_once().await {
                Ok(Some(status)) => tracing::warn!(source = %self.label, %status, "process exited"),
                Ok(None) => {}
                Err(err) => tracing::error!(source = %self.label, %err, "process source failed"),
            }
            if self.is_stopped() {
                break;
            }
            tracing::warn!(source = %self.label, backoff = ?self.backoff, "restarting process");
            tokio::select! {
                () = tokio::time::sleep(self.backoff) => {}
                _ = self.stopped.changed() => {}
            }
        }
        tracing::info!(source = %self.label, "listen loop ended");
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.borrow() || self.stopped.has_changed().is_err()
    }

    /// Run the command once. `Ok(None)` means it was stopped on request.
    async fn run_once(&mut self) -> io::Result<Option<ExitStatus>> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not captured"))?;
        tracing::debug!(source = %self.label, pid = ?child.id(), "process spawned");

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            tokio::select! {
                biased;
                _ = self.stopped.changed() => {
                    child.kill().await?;
                    return Ok(None);
                }
                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => break,
                    Ok(_) if self.is_stopped() => {
                        child.kill().await?;
                        return Ok(None);
                    }
                    Ok(_) => self.feed(&String::from_utf8_lossy(&buf)),
                    Err(err) => {
                        self.kill(&mut child).await;
                        return Err(err);
                    }
                },
            }
        }

        child.wait().await.map(Some)
    }

    async fn kill(&self, child: &mut Child) {
        if let Err(err) = child.kill().await {
            tracing::warn!(source = %self.label, %err, "unable to kill process");
        }
    }

    fn feed(&self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        tracing::debug!(source = %self.label, line, "processing line");
        self.root.dispatch(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn collect(source: &ProcessSource) -> Seen {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        source.root().on_match(move |line, _| {
            sink.lock().unwrap().push(line.to_string());
            Ok(())
        });
        seen
    }

    fn count(seen: &Seen) -> usize {
        seen.lock().unwrap().len()
    }

    async fn wait_for(seen: &Seen, at_least: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while count(seen) < at_least {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("lines should arrive in time");
    }

    #[tokio::test]
    async fn should_feed_trimmed_non_empty_lines() {
        let source = ProcessSource::new("printf 'one\\n\\n  two  \\n'")
            .with_backoff(Duration::from_secs(30));
        let seen = collect(&source);
        source.start().unwrap();

        wait_for(&seen, 2).await;
        source.stop();
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn should_dispatch_into_filters() {
        let source = ProcessSource::new("echo 'devices/5/state power:1 speed:3'")
            .with_backoff(Duration::from_secs(30));
        let speeds: Seen = Arc::default();
        let sink = Arc::clone(&speeds);
        source
            .filter(r"devices/5/state.*speed:(\d)")
            .unwrap()
            .on_match(move |_, speed| {
                sink.lock().unwrap().push(speed.to_string());
                Ok(())
            });
        source.start().unwrap();

        wait_for(&speeds, 1).await;
        source.stop();
        assert_eq!(*speeds.lock().unwrap(), vec!["3"]);
    }

    #[tokio::test]
    async fn should_restart_after_exit() {
        let source = ProcessSource::new("echo tick").with_backoff(Duration::from_millis(50));
        let seen = collect(&source);
        source.start().unwrap();

        wait_for(&seen, 3).await;
        source.stop();
        assert!(seen.lock().unwrap().iter().all(|line| line == "tick"));
    }

    #[tokio::test]
    async fn should_not_restart_when_stopped_during_backoff() {
        let source = ProcessSource::new("echo once").with_backoff(Duration::from_millis(300));
        let seen = collect(&source);
        source.start().unwrap();

        wait_for(&seen, 1).await;
        source.stop();
        assert!(!source.is_running());

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(count(&seen), 1);
    }

    #[tokio::test]
    async fn should_kill_process_on_stop() {
        let source = ProcessSource::new("echo start; sleep 1; echo late")
            .with_backoff(Duration::from_secs(30));
        let seen = collect(&source);
        source.start().unwrap();

        wait_for(&seen, 1).await;
        source.stop();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["start"]);
    }

    #[tokio::test]
    async fn should_ignore_second_start() {
        let source = ProcessSource::new("echo x").with_backoff(Duration::from_secs(30));
        let seen = collect(&source);
        source.start().unwrap();
        source.start().unwrap();

        wait_for(&seen, 1).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        source.stop();
        assert_eq!(count(&seen), 1);
    }

    #[tokio::test]
    async fn should_keep_retrying_when_spawn_fails() {
        let source = ProcessSource::new("echo x")
            .with_shell("/nonexistent/shell")
            .with_backoff(Duration::from_millis(20));
        source.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(source.is_running());
        source.stop();
        assert!(!source.is_running());
    }

    #[tokio::test]
    async fn should_start_again_after_stop() {
        let source = ProcessSource::new("echo again").with_backoff(Duration::from_secs(30));
        let seen = collect(&source);
        source.start().unwrap();
        wait_for(&seen, 1).await;
        source.stop();

        source.start().unwrap();
        wait_for(&seen, 2).await;
        source.stop();
        assert_eq!(count(&seen), 2);
    }

    #[tokio::test]
    async fn should_discard_buffered_output_after_stop() {
        for _ in 0..10 {
            let source = ProcessSource::new("yes line").with_backoff(Duration::from_secs(30));
            let seen = collect(&source);
            source.start().unwrap();

            wait_for(&seen, 10).await;
            source.stop();
            let at_stop = count(&seen);

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(count(&seen), at_stop);
        }
    }

    #[test]
    fn should_require_a_runtime() {
        let source = ProcessSource::new("echo x");
        assert!(matches!(source.start(), Err(KernelError::NoRuntime(_))));
        assert!(!source.is_running());
    }
}
