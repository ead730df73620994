//! The dedicated queue that executes host-to-device transfers.

use crate::{common::*, dataset::Batch, error::TransferError};

struct TransferJob {
    batch: Batch,
    reply: flume::Sender<Result<Batch>>,
}

/// A worker thread that runs submitted transfer jobs one at a time in submission order.
///
/// Submitting a job never blocks the caller. Each job yields a [PendingTransfer]
/// handle, and waiting on it blocks until that job has finished. Dropping the
/// stream lets an in-flight job run to completion and discards its result.
#[derive(Debug)]
pub struct TransferStream {
    job_tx: Option<flume::Sender<TransferJob>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TransferStream {
    pub fn spawn<F>(name: &str, mut transfer: F) -> Result<Self>
    where
        F: 'static + FnMut(Batch) -> Result<Batch> + Send,
    {
        let (job_tx, job_rx) = flume::unbounded::<TransferJob>();

        let worker = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while let Ok(TransferJob { batch, reply }) = job_rx.recv() {
                    let result = transfer(batch);

                    // the receiver is gone if the consumer stopped early
                    let _ = reply.send(result);
                }
                debug!("transfer stream is closed");
            })
            .with_context(|| format!("failed to spawn transfer stream '{}'", name))?;

        Ok(Self {
            job_tx: Some(job_tx),
            worker: Some(worker),
        })
    }

    /// Queue a batch for transfer.
    pub fn submit(&self, batch: Batch) -> Result<PendingTransfer> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        let job = TransferJob {
            batch,
            reply: reply_tx,
        };

        self.job_tx
            .as_ref()
            .ok_or(TransferError::StreamClosed)?
            .send(job)
            .map_err(|_| TransferError::StreamClosed)?;

        Ok(PendingTransfer { reply: reply_rx })
    }
}

impl Drop for TransferStream {
    fn drop(&mut self) {
        // closing the job queue stops the worker loop
        self.job_tx = None;

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("transfer stream worker panicked");
            }
        }
    }
}

/// The completion handle of one submitted transfer.
#[derive(Debug)]
pub struct PendingTransfer {
    reply: flume::Receiver<Result<Batch>>,
}

impl PendingTransfer {
    /// Block until the transfer has completed.
    pub fn wait(self) -> Result<Batch> {
        self.reply
            .recv()
            .map_err(|_| TransferError::StreamClosed)?
    }

    /// Check whether the transfer has completed without blocking.
    pub fn is_ready(&self) -> bool {
        !self.reply.is_empty()
    }
}
