//! # Cell Streaming
//!
//! Loads and saves cell records off the simulation thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  Request (FIFO)   ┌──────────────┐
//! │ Simulation │──────────────────>│ atlas-cell-io│──> CellStore
//! │  boundary  │<──────────────────│    worker    │
//! └────────────┘  StreamResult     └──────────────┘
//! ```
//!
//! One worker drains one FIFO channel, so a save of a cell always reaches
//! the store before any later load of the same cell. Results are polled at
//! the phase boundary; the frame never waits on I/O.
//!
//! ## Unconfirmed saves
//!
//! A record handed to `request_save` stays with the streamer until the
//! store confirms it. Failed saves are retried like failed loads, and a
//! cell that re-enters the window before its save is confirmed is restored
//! from the kept record with `take_unsaved` instead of the store.

use std::collections::{BTreeMap, VecDeque};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use atlas_core::{SimError, SimResult};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::cell::CellCoord;
use crate::persistence::CellRecord;
use crate::store::CellStore;

enum Request {
    Load(CellCoord),
    Save {
        coord: CellCoord,
        ticket: u64,
        bytes: Vec<u8>,
    },
}

/// A record waiting for the store to confirm it.
struct Unsaved {
    record: CellRecord,
    bytes: Vec<u8>,
    /// Ticket of the latest submission; older results are stale.
    ticket: u64,
}

/// Outcome of one streaming request.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamResult {
    /// The cell's record, or `None` if it was never saved.
    Loaded {
        /// The cell.
        coord: CellCoord,
        /// Decoded record.
        record: Option<CellRecord>,
    },
    /// The load failed; the cell should stay pending and be retried.
    LoadFailed {
        /// The cell.
        coord: CellCoord,
        /// Why.
        error: SimError,
    },
    /// The record reached the store.
    Saved {
        /// The cell.
        coord: CellCoord,
        /// Submission this result answers.
        ticket: u64,
    },
    /// The save failed; the record is kept for a retry.
    SaveFailed {
        /// The cell.
        coord: CellCoord,
        /// Submission this result answers.
        ticket: u64,
        /// Why.
        error: SimError,
    },
}

enum Mode {
    Worker {
        requests: Option<Sender<Request>>,
        results: Receiver<StreamResult>,
        handle: Option<JoinHandle<()>>,
    },
    Inline {
        store: Box<dyn CellStore>,
        ready: VecDeque<StreamResult>,
    },
}

/// Asynchronous cell loader/saver with retry bookkeeping.
pub struct CellStreamer {
    mode: Mode,
    in_flight: usize,
    retry_after: u64,
    /// Cell -> frame at which to retry its load.
    retries: BTreeMap<CellCoord, u64>,
    /// Cell -> frame at which to resubmit its unconfirmed save.
    save_retries: BTreeMap<CellCoord, u64>,
    unsaved: BTreeMap<CellCoord, Unsaved>,
    next_ticket: u64,
}

impl CellStreamer {
    /// Starts a background worker over `store`.
    ///
    /// # Errors
    ///
    /// `IoFailure` if the worker thread cannot be spawned.
    pub fn spawn(store: Box<dyn CellStore>, retry_after: u64) -> SimResult<Self> {
        let (request_tx, request_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();

        let handle = thread::Builder::new()
            .name("atlas-cell-io".into())
            .spawn(move || worker_loop(store, &request_rx, &result_tx))
            .map_err(|e| SimError::IoFailure(format!("failed to spawn cell I/O worker: {e}")))?;

        Ok(Self {
            mode: Mode::Worker {
                requests: Some(request_tx),
                results: result_rx,
                handle: Some(handle),
            },
            in_flight: 0,
            retry_after,
            retries: BTreeMap::new(),
            save_retries: BTreeMap::new(),
            unsaved: BTreeMap::new(),
            next_ticket: 0,
        })
    }

    /// Runs every request synchronously on the calling thread.
    #[must_use]
    pub fn inline(store: Box<dyn CellStore>, retry_after: u64) -> Self {
        Self {
            mode: Mode::Inline {
                store,
                ready: VecDeque::new(),
            },
            in_flight: 0,
            retry_after,
            retries: BTreeMap::new(),
            save_retries: BTreeMap::new(),
            unsaved: BTreeMap::new(),
            next_ticket: 0,
        }
    }

    fn submit(&mut self, request: Request) {
        self.in_flight += 1;
        match &mut self.mode {
            Mode::Worker { requests, .. } => {
                let sent = requests.as_ref().is_some_and(|tx| tx.send(request).is_ok());
                if !sent {
                    self.in_flight -= 1;
                    tracing::error!("cell I/O worker is gone, request dropped");
                }
            }
            Mode::Inline { store, ready } => {
                ready.push_back(execute(store.as_mut(), request));
            }
        }
    }

    /// Queues a load of `coord`.
    pub fn request_load(&mut self, coord: CellCoord) {
        self.retries.remove(&coord);
        self.submit(Request::Load(coord));
    }

    /// Queues a save of `record` and keeps it until the store confirms it.
    ///
    /// A newer record for the same cell replaces an unconfirmed older one.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if the record cannot be encoded; nothing is kept.
    pub fn request_save(&mut self, record: CellRecord) -> SimResult<()> {
        let coord = record.coord;
        let bytes = record.encode()?;
        self.retries.remove(&coord);
        self.save_retries.remove(&coord);
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.submit(Request::Save {
            coord,
            ticket,
            bytes: bytes.clone(),
        });
        self.unsaved.insert(
            coord,
            Unsaved {
                record,
                bytes,
                ticket,
            },
        );
        Ok(())
    }

    /// Collects every finished request without blocking.
    pub fn poll(&mut self) -> Vec<StreamResult> {
        let results: Vec<_> = match &mut self.mode {
            Mode::Worker { results, .. } => results.try_iter().collect(),
            Mode::Inline { ready, .. } => ready.drain(..).collect(),
        };
        self.in_flight -= results.len().min(self.in_flight);
        results
    }

    /// Waits up to `timeout` for one finished request.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<StreamResult> {
        let result = match &mut self.mode {
            Mode::Worker { results, .. } => match results.recv_timeout(timeout) {
                Ok(result) => Some(result),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
            },
            Mode::Inline { ready, .. } => ready.pop_front(),
        };
        if result.is_some() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
        result
    }

    /// Requests submitted and not yet polled.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    // =========================================================================
    // Retries
    // =========================================================================

    /// Schedules a retry of a failed load `retry_after` frames from `frame`.
    pub fn schedule_retry(&mut self, coord: CellCoord, frame: u64) {
        self.retries.insert(coord, frame + self.retry_after);
    }

    /// Drops a scheduled retry (the cell left the window).
    pub fn cancel_retry(&mut self, coord: CellCoord) {
        self.retries.remove(&coord);
    }

    /// Removes and returns the cells whose retry is due at `frame`.
    pub fn due_retries(&mut self, frame: u64) -> Vec<CellCoord> {
        let due: Vec<_> = self
            .retries
            .iter()
            .filter(|(_, &at)| at <= frame)
            .map(|(&coord, _)| coord)
            .collect();
        for coord in &due {
            self.retries.remove(coord);
        }
        due
    }

    /// Cells with a scheduled retry.
    #[must_use]
    pub fn retrying(&self) -> Vec<CellCoord> {
        self.retries.keys().copied().collect()
    }

    // =========================================================================
    // Unconfirmed saves
    // =========================================================================

    /// Releases the kept record once the store holds it.
    ///
    /// Returns false for a stale ticket (a newer save is pending).
    pub fn confirm_save(&mut self, coord: CellCoord, ticket: u64) -> bool {
        if self.unsaved.get(&coord).map(|u| u.ticket) != Some(ticket) {
            return false;
        }
        self.unsaved.remove(&coord);
        self.save_retries.remove(&coord);
        true
    }

    /// Schedules a resubmit of a failed save `retry_after` frames from
    /// `frame`.
    ///
    /// Returns false for a stale ticket, which needs no retry.
    pub fn schedule_save_retry(&mut self, coord: CellCoord, ticket: u64, frame: u64) -> bool {
        if self.unsaved.get(&coord).map(|u| u.ticket) != Some(ticket) {
            return false;
        }
        self.save_retries.insert(coord, frame + self.retry_after);
        true
    }

    /// Resubmits every save whose retry is due at `frame`.
    ///
    /// Returns the resubmitted cells.
    pub fn resubmit_due_saves(&mut self, frame: u64) -> Vec<CellCoord> {
        let due: Vec<_> = self
            .save_retries
            .iter()
            .filter(|(_, &at)| at <= frame)
            .map(|(&coord, _)| coord)
            .collect();
        let mut resubmitted = Vec::with_capacity(due.len());
        for coord in due {
            self.save_retries.remove(&coord);
            let Some(unsaved) = self.unsaved.get_mut(&coord) else {
                continue;
            };
            self.next_ticket += 1;
            let ticket = self.next_ticket;
            unsaved.ticket = ticket;
            let bytes = unsaved.bytes.clone();
            self.submit(Request::Save {
                coord,
                ticket,
                bytes,
            });
            resubmitted.push(coord);
        }
        resubmitted
    }

    /// Takes back the unconfirmed record of `coord`, if any.
    ///
    /// The cell's pending retry is dropped and results of its earlier
    /// submissions become stale.
    pub fn take_unsaved(&mut self, coord: CellCoord) -> Option<CellRecord> {
        self.save_retries.remove(&coord);
        self.unsaved.remove(&coord).map(|u| u.record)
    }

    /// Returns true if `coord` has a record the store has not confirmed.
    #[must_use]
    pub fn has_unsaved(&self, coord: CellCoord) -> bool {
        self.unsaved.contains_key(&coord)
    }

    /// Cells whose records the store has not confirmed.
    #[must_use]
    pub fn unsaved_cells(&self) -> Vec<CellCoord> {
        self.unsaved.keys().copied().collect()
    }
}

impl Drop for CellStreamer {
    fn drop(&mut self) {
        if let Mode::Worker { requests, handle, .. } = &mut self.mode {
            // Closing the channel lets the worker finish queued saves and exit.
            drop(requests.take());
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    tracing::error!("cell I/O worker panicked");
                }
            }
        }

        for result in self.poll() {
            if let StreamResult::Saved { coord, ticket } = result {
                self.confirm_save(coord, ticket);
            }
        }
        if !self.unsaved.is_empty() {
            let entities: usize = self.unsaved.values().map(|u| u.record.entities.len()).sum();
            tracing::error!(
                cells = self.unsaved.len(),
                entities,
                "cell records never reached the store"
            );
        }
    }
}

fn worker_loop(mut store: Box<dyn CellStore>, requests: &Receiver<Request>, results: &Sender<StreamResult>) {
    tracing::debug!("cell I/O worker started");
    for request in requests {
        if results.send(execute(store.as_mut(), request)).is_err() {
            break;
        }
    }
    tracing::debug!("cell I/O worker stopped");
}

fn execute(store: &mut dyn CellStore, request: Request) -> StreamResult {
    match request {
        Request::Load(coord) => match load(store, coord) {
            Ok(record) => StreamResult::Loaded { coord, record },
            Err(error) => StreamResult::LoadFailed { coord, error },
        },
        Request::Save {
            coord,
            ticket,
            bytes,
        } => match store.save(coord, &bytes) {
            Ok(()) => StreamResult::Saved { coord, ticket },
            Err(error) => StreamResult::SaveFailed {
                coord,
                ticket,
                error,
            },
        },
    }
}

fn load(store: &mut dyn CellStore, coord: CellCoord) -> SimResult<Option<CellRecord>> {
    let Some(bytes) = store.load(coord)? else {
        return Ok(None);
    };
    let record = CellRecord::decode(&bytes)?;
    if record.coord != coord {
        return Err(SimError::IoFailure(format!(
            "record for cell {} stored under cell {coord}",
            record.coord
        )));
    }
    Ok(Some(record))
}
