//! Single-threaded event loop.
//!
//! Host samples, refresh ticks and shutdown requests all arrive on one
//! channel and are handled one at a time, so the orchestrator never sees
//! concurrent callbacks. Producers (the stdin reader, the signal handler) run
//! on their own threads and only ever send [`Event`]s.

use std::io::BufRead;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::delta::DeltaBatch;
use crate::logging::{Component, LogSink};
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Deltas(DeltaBatch),
    /// The refresh interval elapsed without a fetch trigger.
    Tick,
    /// A feed line that could not be decoded.
    Malformed(String),
    Shutdown,
}

pub struct EventLoop {
    events: Receiver<Event>,
    tick_every: Duration,
    next_tick: Instant,
}

impl EventLoop {
    pub fn new(events: Receiver<Event>, tick_every: Duration) -> Self {
        Self {
            events,
            tick_every,
            next_tick: Instant::now() + tick_every,
        }
    }

    /// Blocks until the next event. A tick is produced when the deadline
    /// passes; a closed channel reads as shutdown.
    pub fn next_event(&mut self) -> Event {
        let wait = self.next_tick.saturating_duration_since(Instant::now());
        match self.events.recv_timeout(wait) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                self.next_tick = Instant::now() + self.tick_every;
                Event::Tick
            }
            Err(RecvTimeoutError::Disconnected) => Event::Shutdown,
        }
    }
}

/// Reads one JSON delta batch per line until EOF, then requests shutdown.
pub fn spawn_line_reader<R>(reader: R, tx: Sender<Event>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::error!("Failed to read delta feed: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<DeltaBatch>(&line) {
                Ok(batch) => Event::Deltas(batch),
                Err(e) => Event::Malformed(e.to_string()),
            };
            if tx.send(event).is_err() {
                return;
            }
        }
        let _ = tx.send(Event::Shutdown);
    })
}

/// Drives the orchestrator until shutdown, then stops it.
pub fn run(orchestrator: &mut Orchestrator, event_loop: &mut EventLoop) {
    while orchestrator.is_alive() {
        match event_loop.next_event() {
            Event::Deltas(batch) => orchestrator.on_deltas_at(&batch, Utc::now()),
            Event::Tick => orchestrator.on_tick_at(Utc::now()),
            Event::Malformed(reason) => orchestrator
                .log()
                .warn(Component::Host, &format!("Ignoring malformed delta: {}", reason)),
            Event::Shutdown => break,
        }
    }
    orchestrator.stop();
}
