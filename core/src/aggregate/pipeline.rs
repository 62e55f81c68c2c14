use std::{mem, sync::Arc, thread::spawn};

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, Sender};
use log::debug;

use crate::{event::PointEvent, index::SpatialIndex};

use super::{reduce, Accumulator, CombineMode, Counts, PointMapper};

/// Options for [`run()`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// The number of worker threads mapping events
    pub workers: usize,

    /// The number of events sent to a worker at once
    pub batch_size: usize,

    /// The number of batches that may be queued before the reader blocks
    pub channel_capacity: usize,

    /// Whether workers combine their contributions before reduction
    pub combine: CombineMode,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            batch_size: 1024,
            channel_capacity: 16,
            combine: CombineMode::Combine,
        }
    }
}

/// Aggregates a stream of events on a pool of worker threads. Every worker
/// maps and combines the batches it receives into a partial. All partials
/// are reduced when the stream has ended.
///
/// The result is all-or-nothing: if the stream yields an error, no counts
/// are returned.
pub fn run<S, I, E>(index: Arc<S>, events: I, options: PipelineOptions) -> Result<Counts>
where
    S: SpatialIndex + Send + Sync + 'static,
    I: IntoIterator<Item = Result<PointEvent, E>>,
    E: Into<anyhow::Error>,
{
    let (batch_send, batch_recv) = bounded::<Vec<PointEvent>>(options.channel_capacity.max(1));
    let workers = (0..options.workers.max(1))
        .map(|worker| {
            let index = Arc::clone(&index);
            let batch_recv = batch_recv.clone();
            spawn(move || {
                let mapper = PointMapper::new(index.as_ref());
                let mut acc = Accumulator::new(options.combine);
                for batch in batch_recv {
                    for e in &batch {
                        acc.add(mapper.map(e));
                    }
                }
                debug!("Worker {worker} mapped {} events", acc.contributions());
                acc.finish()
            })
        })
        .collect::<Vec<_>>();
    drop(batch_recv);

    let fed = feed(events, &batch_send, options.batch_size.max(1));

    // workers end as soon as the channel is closed
    drop(batch_send);
    let mut partials = Vec::with_capacity(workers.len());
    for worker in workers {
        match worker.join() {
            Ok(partial) => partials.push(partial),
            Err(err) => bail!("Worker thread threw an error: {err:?}"),
        }
    }

    let total = fed?;
    let counts = reduce(partials);
    debug!("Aggregated {total} events into {} keys", counts.len());
    Ok(counts)
}

/// Sends events to the workers in batches. Returns the number of events sent.
fn feed<I, E>(events: I, batch_send: &Sender<Vec<PointEvent>>, batch_size: usize) -> Result<u64>
where
    I: IntoIterator<Item = Result<PointEvent, E>>,
    E: Into<anyhow::Error>,
{
    let mut total = 0;
    let mut batch = Vec::with_capacity(batch_size);
    for e in events {
        batch.push(e.map_err(Into::into)?);
        total += 1;
        if batch.len() == batch_size {
            batch_send.send(mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
        }
    }
    if !batch.is_empty() {
        batch_send.send(batch)?;
    }
    Ok(total)
}
