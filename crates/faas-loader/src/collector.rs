//! Fan-in of the records produced by all drivers.
//!
//! The collector cannot know the number of records to expect before every driver has finished
//! issuing, so the total is announced separately through a oneshot channel. Until then the expected
//! total is `u64::MAX`, which the record counters never reach. Completion is checked after every
//! event, so the total may arrive before, between or after the records.
use std::path::PathBuf;

use log::info;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::DriverConfiguration;
use crate::dispatcher::RecordSink;
use crate::error::{LoaderError, Result};
use crate::invocation::{ExecutionRecord, JobExecutionRecord};
use crate::output::{create_output_file, spawn_csv_writer, spawn_json_lines_writer};
use crate::util::CompletionToken;

/// Capacity of the inbound record queues.
pub const RECORD_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub records: u64,
    pub job_records: u64,
}

pub struct RecordCollector {
    records: mpsc::Receiver<ExecutionRecord>,
    job_records: mpsc::Receiver<JobExecutionRecord>,
    total: oneshot::Receiver<u64>,
    record_writer: mpsc::Sender<ExecutionRecord>,
    record_writer_handle: JoinHandle<Result<u64>>,
    job_writer: mpsc::Sender<JobExecutionRecord>,
    job_writer_handle: JoinHandle<Result<u64>>,
    pub duration_path: PathBuf,
    pub joblogs_path: PathBuf,
}

impl RecordCollector {
    /// Creates the output files and their writers.
    ///
    /// Returns the collector together with the sink drivers push records into and the sender the
    /// orchestrator announces the total number of records with.
    pub fn create(configuration: &DriverConfiguration) -> Result<(Self, RecordSink, oneshot::Sender<u64>)> {
        let duration_path = configuration.output_filename("duration", "csv");
        let joblogs_path = configuration.output_filename("joblogs", "json");
        let duration_file = create_output_file(&duration_path)?;
        let joblogs_file = create_output_file(&joblogs_path)?;

        let (record_writer, rx) = mpsc::channel(RECORD_QUEUE_CAPACITY);
        let record_writer_handle = spawn_csv_writer(duration_path.clone(), duration_file, rx);
        let (job_writer, rx) = mpsc::channel(RECORD_QUEUE_CAPACITY);
        let job_writer_handle = spawn_json_lines_writer(joblogs_path.clone(), joblogs_file, rx);

        let (records_tx, records) = mpsc::channel(RECORD_QUEUE_CAPACITY);
        let (job_records_tx, job_records) = mpsc::channel(RECORD_QUEUE_CAPACITY);
        let (total_tx, total) = oneshot::channel();
        let collector = Self {
            records,
            job_records,
            total,
            record_writer,
            record_writer_handle,
            job_writer,
            job_writer_handle,
            duration_path,
            joblogs_path,
        };
        Ok((collector, RecordSink::new(records_tx, job_records_tx), total_tx))
    }

    /// Spawns the collector, `ready` is released once it runs.
    pub fn spawn(self, ready: CompletionToken) -> JoinHandle<Result<CollectionSummary>> {
        tokio::spawn(async move {
            drop(ready);
            self.collect().await
        })
    }

    /// Persists records until the announced total is reached or all senders are gone.
    pub async fn collect(self) -> Result<CollectionSummary> {
        let Self {
            mut records,
            mut job_records,
            mut total,
            record_writer,
            record_writer_handle,
            job_writer,
            job_writer_handle,
            ..
        } = self;

        let mut expected = u64::MAX;
        let mut announced = false;
        let mut written: u64 = 0;
        let mut job_written: u64 = 0;
        let mut records_open = true;
        let mut job_records_open = true;

        while !(written == expected && job_written == expected) {
            tokio::select! {
                record = records.recv(), if records_open => match record {
                    Some(record) => {
                        if record_writer.send(record).await.is_err() {
                            // the writer failed, its error is reported below
                            break;
                        }
                        written += 1;
                    }
                    None => records_open = false,
                },
                job_record = job_records.recv(), if job_records_open => match job_record {
                    Some(job_record) => {
                        if job_writer.send(job_record).await.is_err() {
                            break;
                        }
                        job_written += 1;
                    }
                    None => job_records_open = false,
                },
                announcement = &mut total, if !announced => {
                    announced = true;
                    if let Ok(n) = announcement {
                        info!("Expecting {} records", n);
                        expected = n;
                    }
                },
                else => break,
            }
        }

        drop(record_writer);
        drop(job_writer);
        let records_persisted = record_writer_handle.await??;
        let job_records_persisted = job_writer_handle.await??;
        if expected != u64::MAX && (written != expected || job_written != expected) {
            return Err(LoaderError::IncompleteCollection {
                expected,
                written,
                job_written,
            });
        }
        info!(
            "Collected {} invocation records and {} job records",
            records_persisted, job_records_persisted
        );
        Ok(CollectionSummary {
            records: records_persisted,
            job_records: job_records_persisted,
        })
    }
}
