//! Background spilling.

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use rayon;

use crate::buffer::RunBuffer;
use crate::sort::SortError;
use crate::source::DiskSource;
use crate::spill::SpillWriter;

type SpillResult = std::io::Result<DiskSource>;

/// Spill queue of capacity one.
///
/// A submitted run is sorted and spilled by a task on the thread pool while the caller goes on
/// reading the next run. Submitting another run first waits for the outstanding task, so at most
/// one run is being spilled at any time.
pub struct SpillQueue<'p> {
    pool: &'p rayon::ThreadPool,
    writer: SpillWriter,
    pending: Option<mpsc::Receiver<SpillResult>>,
    spilled: Vec<DiskSource>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl<'p> SpillQueue<'p> {
    pub fn new(pool: &'p rayon::ThreadPool, writer: SpillWriter) -> Self {
        SpillQueue {
            pool,
            writer,
            pending: None,
            spilled: Vec::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hands the run over to a background spill task.
    /// Blocks until the previously submitted run is spilled.
    pub fn submit(&mut self, run: RunBuffer) -> Result<(), SortError> {
        self.wait()?;

        let (sender, receiver) = mpsc::sync_channel(1);
        let writer = self.writer.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let peak_in_flight = Arc::clone(&self.peak_in_flight);

        self.pool.spawn(move || {
            let depth = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak_in_flight.fetch_max(depth, Ordering::SeqCst);

            let result = writer.sort_and_spill(run);

            in_flight.fetch_sub(1, Ordering::SeqCst);
            // if the queue is gone the source is dropped here, which removes its file
            let _ = sender.send(result);
        });
        self.pending = Some(receiver);

        return Ok(());
    }

    /// Waits for the outstanding task and returns sources of all spilled runs in submission order.
    pub fn finish(mut self) -> Result<Vec<DiskSource>, SortError> {
        self.wait()?;
        return Ok(mem::take(&mut self.spilled));
    }

    /// Whether a spill task is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of runs spilled and collected so far.
    pub fn spilled(&self) -> usize {
        self.spilled.len()
    }

    /// Maximum number of spill tasks observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn wait(&mut self) -> Result<(), SortError> {
        if let Some(receiver) = self.pending.take() {
            let source = receiver
                .recv()
                .map_err(|_| SortError::WorkerLost)?
                .map_err(SortError::IO)?;
            self.spilled.push(source);
        }

        return Ok(());
    }
}

impl<'p> Drop for SpillQueue<'p> {
    fn drop(&mut self) {
        // an abandoned queue still joins its task so that no spill file outlives it
        if let Some(receiver) = self.pending.take() {
            let _ = receiver.recv();
        }
    }
}
