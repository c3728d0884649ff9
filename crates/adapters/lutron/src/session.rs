//! Telnet session with the main repeater.
//!
//! One task owns the socket. It logs in, enables monitoring, then
//! multiplexes three event sources: monitoring lines (dispatched to the
//! filter tree), outbound commands (written to the socket) and the stop
//! signal. Any failure ends the session; the task reconnects after the
//! configured delay until it is stopped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relayhub_kernel::FilterNode;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::config::LutronConfig;
use crate::error::LutronError;

/// Enables sysvar monitoring on top of the default event set.
pub(crate) const MONITORING: &str = "#MONITORING,10,1";

/// Outbound half shared by device actions and the session task.
#[derive(Default)]
pub(crate) struct Link {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Link {
    /// Queue `command` for the current session.
    pub fn send(&self, command: &str) -> Result<(), LutronError> {
        let outbound = self.lock();
        let sender = outbound.as_ref().ok_or(LutronError::NotConnected)?;
        tracing::debug!(command, "queueing command");
        sender
            .send(command.to_string())
            .map_err(|_| LutronError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().as_ref().is_some_and(|sender| !sender.is_closed())
    }

    fn attach(&self) -> mpsc::UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.lock() = Some(sender);
        receiver
    }

    pub fn detach(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct Session {
    pub label: String,
    pub config: Arc<LutronConfig>,
    pub root: FilterNode,
    pub link: Arc<Link>,
    pub stopped: watch::Receiver<bool>,
}

impl Session {
    pub async fn run(mut self) {
        while !self.is_stopped() {
            if let Err(err) = self.connect_once().await {
                tracing::error!(service = %self.label, %err, "Lutron session failed");
            }
            self.link.detach();
            if self.is_stopped() {
                break;
            }
            let delay = self.config.reconnect_delay();
            tracing::warn!(service = %self.label, ?delay, "reconnecting to Lutron");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = self.stopped.changed() => {}
            }
        }
        tracing::info!(service = %self.label, "Lutron session ended");
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.borrow() || self.stopped.has_changed().is_err()
    }

    /// One connection. `Ok(())` means it was stopped on request.
    async fn connect_once(&mut self) -> Result<(), LutronError> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        tracing::info!(service = %self.label, host = %self.config.host, port = self.config.port, "connected to Lutron");
        let (mut reader, mut writer) = stream.into_split();

        self.read_prompt(&mut reader, "login").await?;
        write_line(&mut writer, &self.config.username).await?;
        self.read_prompt(&mut reader, "password").await?;
        write_line(&mut writer, &self.config.password).await?;
        self.read_prompt(&mut reader, "command").await?;
        write_line(&mut writer, MONITORING).await?;

        let mut outbound = self.link.attach();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(1024);
        loop {
            tokio::select! {
                biased;
                _ = self.stopped.changed() => return Ok(()),
                read = reader.read_until(b'\n', &mut buf) => {
                    if read? == 0 {
                        return Err(LutronError::Closed);
                    }
                    if self.is_stopped() {
                        return Ok(());
                    }
                    self.feed(&String::from_utf8_lossy(&buf));
                    buf.clear();
                }
                Some(command) = outbound.recv() => {
                    tracing::debug!(service = %self.label, command = %command, "sending command");
                    write_line(&mut writer, &command).await?;
                }
            }
        }
    }

    async fn read_prompt(&self, reader: &mut OwnedReadHalf, prompt: &'static str) -> Result<(), LutronError> {
        let mut buf = [0_u8; 1024];
        let read = tokio::time::timeout(self.config.prompt_timeout(), reader.read(&mut buf))
            .await
            .map_err(|_| LutronError::PromptTimeout(prompt))??;
        if read == 0 {
            return Err(LutronError::Closed);
        }
        tracing::debug!(
            service = %self.label,
            prompt = %String::from_utf8_lossy(&buf[..read]).trim(),
            "server prompt"
        );
        Ok(())
    }

    fn feed(&self, raw: &str) {
        let line = clean_line(raw);
        if line.is_empty() {
            return;
        }
        if self.root.dispatch(line) {
            tracing::debug!(service = %self.label, line, "processed line");
        } else {
            tracing::trace!(service = %self.label, line, "unhandled line");
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), LutronError> {
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    Ok(())
}

/// Strip line endings and the `GNET>` prompts the repeater echoes in front
/// of monitoring events.
pub(crate) fn clean_line(raw: &str) -> &str {
    let mut line = raw.trim();
    while let Some(rest) = line.strip_prefix("GNET>") {
        line = rest.trim_start();
    }
    line
}
