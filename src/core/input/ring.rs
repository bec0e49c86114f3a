//! Report queue between a sampling thread and the main tick.
//!
//! Unbounded FIFO: enqueue never blocks the producer, dequeue never blocks the
//! consumer. Reports come out in the order they were produced.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use super::SensorReport;

pub struct SensorRing;

impl SensorRing {
    #[inline(always)]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (ReportProducer, ReportConsumer) {
        let (tx, rx) = unbounded();
        (ReportProducer { tx }, ReportConsumer { rx })
    }
}

/// Producer half; cloneable so several devices can feed one bank.
#[derive(Clone, Debug)]
pub struct ReportProducer {
    tx: Sender<SensorReport>,
}

impl ReportProducer {
    /// Returns `false` once the consumer is gone; the report is dropped.
    #[inline(always)]
    pub fn enqueue(&self, report: SensorReport) -> bool {
        self.tx.send(report).is_ok()
    }
}

#[derive(Debug)]
pub struct ReportConsumer {
    rx: Receiver<SensorReport>,
}

impl ReportConsumer {
    #[inline(always)]
    pub fn try_dequeue(&self) -> Option<SensorReport> {
        match self.rx.try_recv() {
            Ok(report) => Some(report),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
