//! Background sensor sampling loop.
//!
//! One long-lived thread per sensor bank. Every polling interval it reads the
//! state of every sensor in its source and enqueues one report per sensor,
//! duplicates included; filtering is the dispatcher's job. The thread only
//! ever produces into the ring, it never touches dispatcher state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info};
use thiserror::Error;

use super::{ReportProducer, SensorClass, SensorReport, SensorStatus};
use crate::core::priority::{self, ThreadPriority};

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("sensor {index} read failed: {reason}")]
    Read { index: usize, reason: String },
    #[error("sensor device disconnected")]
    Disconnected,
}

/// Something that can report the instantaneous state of a bank of sensors.
pub trait SensorSource: Send + 'static {
    fn sensor_count(&self) -> usize;

    fn read(&mut self, index: usize) -> Result<SensorStatus, SampleError>;
}

/// Cooperative shutdown flag shared between the owner and sampling threads.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerConfig {
    pub class: SensorClass,
    /// Zero polls as fast as possible.
    pub polling_interval: Duration,
    pub priority: ThreadPriority,
}

pub struct SamplerHandle {
    class: SensorClass,
    stop: StopSignal,
    thread: Option<thread::JoinHandle<()>>,
}

impl SamplerHandle {
    #[inline(always)]
    pub const fn class(&self) -> SensorClass {
        self.class
    }

    /// Signal the loop and wait for it to observe the signal, which happens
    /// within one polling interval.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.stop();
        if let Some(t) = self.thread.take()
            && t.join().is_err()
        {
            error!("{} sampler thread panicked.", self.class);
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Spawn the sampling loop for one bank.
pub fn spawn<S: SensorSource>(
    config: SamplerConfig,
    source: S,
    producer: ReportProducer,
    stop: StopSignal,
) -> std::io::Result<SamplerHandle> {
    let thread_stop = stop.clone();
    let thread = thread::Builder::new()
        .name(format!("{}-sampler", config.class.as_str().to_ascii_lowercase()))
        .spawn(move || {
            priority::apply_to_current_thread(config.priority);
            run(config, source, &producer, &thread_stop);
        })?;
    info!(
        "{} sampler started ({} ms polling).",
        config.class,
        config.polling_interval.as_millis()
    );
    Ok(SamplerHandle {
        class: config.class,
        stop,
        thread: Some(thread),
    })
}

/// Loop body; runs on the calling thread until `stop` is raised.
pub fn run<S: SensorSource>(
    config: SamplerConfig,
    mut source: S,
    producer: &ReportProducer,
    stop: &StopSignal,
) {
    while !stop.is_stopped() {
        let sweep_start = Instant::now();
        if let Err(e) = sample_once(&mut source, producer) {
            error!("From {} listener: {e}", config.class);
        }
        // An overrun skips the sleep rather than going negative.
        if let Some(rest) = config.polling_interval.checked_sub(sweep_start.elapsed())
            && !rest.is_zero()
        {
            thread::sleep(rest);
        }
    }
    info!("{} sampler stopped.", config.class);
}

/// One poll: a single timestamp shared by every report of the sweep.
fn sample_once<S: SensorSource>(
    source: &mut S,
    producer: &ReportProducer,
) -> Result<(), SampleError> {
    let timestamp = Instant::now();
    for index in 0..source.sensor_count() {
        let status = source.read(index)?;
        if !producer.enqueue(SensorReport {
            index,
            status,
            timestamp,
        }) {
            return Err(SampleError::Disconnected);
        }
    }
    Ok(())
}
