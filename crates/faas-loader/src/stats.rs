//! Invocation counters shared between drivers and their in-flight invocations.
use std::sync::atomic::{AtomicI64, Ordering};

/// Per-function outcome counters, updated concurrently by the function's invocations.
pub struct InvocationCounters {
    successful: AtomicI64,
    failed: AtomicI64,
    failed_by_minute: Vec<AtomicI64>,
}

impl InvocationCounters {
    pub fn new(trace_duration: usize) -> Self {
        Self {
            successful: AtomicI64::new(0),
            failed: AtomicI64::new(0),
            failed_by_minute: (0..trace_duration).map(|_| AtomicI64::new(0)).collect(),
        }
    }

    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self, minute: usize) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        if let Some(counter) = self.failed_by_minute.get(minute) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn successful(&self) -> i64 {
        self.successful.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> i64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn failed_at(&self, minute: usize) -> i64 {
        self.failed_by_minute
            .get(minute)
            .map(|x| x.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

/// Experiment-wide totals, each driver adds its own counts once it has finished.
#[derive(Default)]
pub struct ExperimentCounters {
    successful: AtomicI64,
    failed: AtomicI64,
    issued: AtomicI64,
}

impl ExperimentCounters {
    pub fn add(&self, successful: i64, failed: i64, issued: i64) {
        self.successful.fetch_add(successful, Ordering::SeqCst);
        self.failed.fetch_add(failed, Ordering::SeqCst);
        self.issued.fetch_add(issued, Ordering::SeqCst);
    }

    pub fn summary(&self) -> ExperimentSummary {
        ExperimentSummary {
            successful: self.successful.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            issued: self.issued.load(Ordering::SeqCst),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExperimentSummary {
    pub successful: i64,
    pub failed: i64,
    pub issued: i64,
}

impl ExperimentSummary {
    pub fn print_summary(&self, name: &str) {
        println!("describing {}", name);
        println!("- {} issued invocations", self.issued);
        println!("- {} successful invocations", self.successful);
        println!("- {} failed invocations", self.failed);
        if self.issued > 0 {
            println!("- failure rate = {}", (self.failed as f64) / (self.issued as f64));
        }
    }
}
