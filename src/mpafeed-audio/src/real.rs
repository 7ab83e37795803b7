use std::{
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::queue::SampleQueue;
use crate::{AudioSink, SinkError, StreamFormat};

/// Extra time allowed past the queued audio before the tail is abandoned.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Plays through the default cpal output device.
///
/// The cpal stream lives on its own thread (it is not `Send` everywhere);
/// `write` pushes into a bounded queue and blocks while it is full.
#[derive(Default)]
pub struct CpalSink {
    queue: Option<Arc<SampleQueue>>,
    worker: Option<JoinHandle<()>>,
    capacity: usize,
}

impl std::fmt::Debug for CpalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSink")
            .field("open", &self.queue.is_some())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl CpalSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for CpalSink {
    fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError> {
        self.close();

        let queue = Arc::new(SampleQueue::default());
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), SinkError>>();
        let format = *format;
        let worker_queue = queue.clone();

        let worker = thread::Builder::new()
            .name("mpafeed-cpal".into())
            .spawn(move || run_stream(format, worker_queue, ready_tx))
            .map_err(SinkError::Io)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                // Half a second of audio, but never less than two decode blocks.
                self.capacity =
                    (format.sample_rate as usize * format.channels as usize / 2).max(16_384);
                self.queue = Some(queue);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(SinkError::Backend("output thread exited early".into()))
            }
        }
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        let queue = self.queue.as_ref().ok_or(SinkError::NotOpen)?;
        queue
            .push(block, self.capacity)
            .map_err(SinkError::Backend)
    }

    /// Returns once the queued tail has played out.
    fn close(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_stream(
    format: StreamFormat,
    queue: Arc<SampleQueue>,
    ready: mpsc::Sender<Result<(), SinkError>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready.send(Err(SinkError::Backend("no output device".into())));
        return;
    };

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let data_queue = queue.clone();
    let error_queue = queue.clone();
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [i16], _| data_queue.fill(data),
        move |err| {
            tracing::error!("cpal stream error: {}", err);
            error_queue.fail(err.to_string());
        },
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(%format, "cpal refused stream: {err}");
            let _ = ready.send(Err(SinkError::Declined(format)));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready.send(Err(SinkError::Backend(err.to_string())));
        return;
    }
    tracing::debug!(%format, "cpal output stream started");
    let _ = ready.send(Ok(()));

    queue.wait_closed();
    let queued = format.duration_of(queue.len() as u64);
    let abandoned = queue.wait_drained(queued + DRAIN_GRACE);
    if abandoned > 0 {
        tracing::warn!(samples = abandoned, "output stalled, dropping queued audio");
    }
    drop(stream);
    tracing::debug!("cpal output stream closed");
}
