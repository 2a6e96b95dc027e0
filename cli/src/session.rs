//! Scripted session driver.
//!
//! DESIGN
//! ======
//! A `Driver` owns one canvas `Session` plus the read half of the socket.
//! Script steps run in order; `wait` steps (and the final drain) hand
//! control to `pump_until`, which services inbound frames and fires the
//! session's debounce deadline on a tokio timer. When the socket drops the
//! session is told it is offline, the transport is detached, and the driver
//! reconnects with exponential backoff before rejoining.
//!
//! ERROR HANDLING
//! ==============
//! Sync problems never abort the run: the session keeps unsent edits and
//! replays them after the rejoin snapshot. Only running out of reconnect
//! attempts or an unreadable script ends the run with an error.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::time::Duration;

use canvas::engine::Session;
use canvas::sync::{Inbound, SyncConfig};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CliError;
use crate::script::Step;
use crate::ws::{self, Backoff, WsReader, WsTransport};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Driver {
    url: String,
    backoff: Backoff,
    session: Session<WsTransport>,
    reader: WsReader,
    writer: JoinHandle<()>,
}

impl Driver {
    /// Connect to `url`, join `room_id` and wait for its snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be made, the join cannot be
    /// sent, or no snapshot arrives in time.
    pub async fn join(url: &str, room_id: &str, backoff: Backoff) -> Result<Self, CliError> {
        let conn = ws::connect_with_backoff(url, &backoff).await?;
        let mut session = Session::new(WsTransport::new(conn.tx), SyncConfig::from_env());
        session.join(room_id)?;
        let mut driver = Self { url: url.to_owned(), backoff, session, reader: conn.reader, writer: conn.writer };
        driver.await_snapshot().await?;
        info!(%room_id, elements = driver.session.doc().len(), "joined room");
        Ok(driver)
    }

    #[must_use]
    pub fn session(&self) -> &Session<WsTransport> {
        &self.session
    }

    /// Run every step of a script.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is lost for good or stdout fails.
    pub async fn run(&mut self, steps: Vec<Step>) -> Result<(), CliError> {
        for step in steps {
            debug!(?step, "step");
            self.apply(step).await?;
        }
        Ok(())
    }

    /// Flush, optionally persist, leave the room and close the socket.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the leave could not be sent.
    pub async fn finish(mut self, persist: bool) -> Result<(), CliError> {
        let report = self.session.leave(persist)?;
        info!(upserts = report.upserts, deletes = report.deletes, persist, "left room");
        self.session.sync_mut().transport_mut().detach();
        if let Err(err) = self.writer.await {
            warn!(error = %err, "writer task failed");
        }
        Ok(())
    }

    async fn apply(&mut self, step: Step) -> Result<(), CliError> {
        let s = &mut self.session;
        match step {
            Step::Tool(tool) => {
                s.set_tool(tool);
            }
            Step::PointerDown(at, mods) => {
                s.on_pointer_down(at, mods);
            }
            Step::PointerMove(at, mods) => {
                s.on_pointer_move(at, mods);
            }
            Step::PointerUp(at, mods) => {
                s.on_pointer_up(at, mods);
            }
            Step::Key(key, mods) => {
                s.on_key_down(&key, mods);
            }
            Step::Draw { tool, from, to } => {
                let mods = canvas::input::Modifiers::default();
                s.set_tool(tool);
                s.on_pointer_down(from, mods);
                s.on_pointer_move(to, mods);
                s.on_pointer_up(to, mods);
            }
            Step::Select { id, additive } => {
                s.select(id.as_deref(), additive);
            }
            Step::Text { id, text } => {
                s.set_text(&id, &text);
            }
            Step::Run(command) => {
                s.execute(command);
            }
            Step::Clear => {
                s.clear_canvas();
            }
            Step::Wait(duration) => return self.pump_until(Instant::now() + duration).await,
            Step::Save { persist } => {
                let report = s.save(persist);
                info!(upserts = report.upserts, deletes = report.deletes, failed = report.failed, persist, "saved");
            }
            Step::Dump => println!("{}", serde_json::to_string_pretty(s.doc().elements())?),
            Step::Status => println!("{:?} ({} elements)", s.status(), s.doc().len()),
        }
        Ok(())
    }

    /// Service the socket and the flush timer until `until`.
    async fn pump_until(&mut self, until: Instant) -> Result<(), CliError> {
        loop {
            let wake = self.session.next_deadline().map_or(until, |d| Instant::from_std(d).min(until));
            tokio::select! {
                frame = ws::next_frame(&mut self.reader) => match frame {
                    Ok(frame) => self.dispatch(frame),
                    Err(err) => {
                        warn!(error = %err, "connection lost");
                        self.reconnect().await?;
                    }
                },
                () = tokio::time::sleep_until(wake) => {
                    if let Some(report) = self.session.tick() {
                        debug!(upserts = report.upserts, deletes = report.deletes, "autosave");
                    }
                    if Instant::now() >= until {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn await_snapshot(&mut self) -> Result<(), CliError> {
        let wait = async {
            loop {
                let frame = ws::next_frame(&mut self.reader).await?;
                if frame.status == frames::Status::Error && frame.syscall == frames::syscall::ROOM_JOIN {
                    let message = frame.error_message().unwrap_or("join rejected").to_owned();
                    return Err(CliError::ServerError { syscall: frame.syscall, message });
                }
                if let Some(message) = ws::inbound_from_frame(frame) {
                    let snapshot = matches!(message, Inbound::Snapshot(_));
                    self.session.handle_inbound(message);
                    if snapshot {
                        return Ok::<(), CliError>(());
                    }
                }
            }
        };
        tokio::time::timeout(SNAPSHOT_TIMEOUT, wait).await.map_err(|_| CliError::Timeout("room snapshot"))?
    }

    fn dispatch(&mut self, frame: frames::Frame) {
        if let Some(message) = ws::inbound_from_frame(frame) {
            self.session.handle_inbound(message);
        }
    }

    async fn reconnect(&mut self) -> Result<(), CliError> {
        self.session.handle_inbound(Inbound::Disconnected);
        self.session.sync_mut().transport_mut().detach();
        let conn = ws::connect_with_backoff(&self.url, &self.backoff).await?;
        self.session.sync_mut().transport_mut().attach(conn.tx);
        self.reader = conn.reader;
        self.writer = conn.writer;
        self.session.handle_inbound(Inbound::Connected);
        self.await_snapshot().await
    }
}
