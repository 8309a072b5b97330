mod common;
use common::make_configuration;

use std::path::Path;

use faas_loader::collector::{CollectionSummary, RecordCollector};
use faas_loader::dispatcher::RecordSink;
use faas_loader::error::LoaderError;
use faas_loader::invocation::{ExecutionRecord, JobExecutionRecord};

fn make_records(i: usize) -> (ExecutionRecord, JobExecutionRecord) {
    let id = format!("func-min0.inv{}", i);
    let mut job_record = JobExecutionRecord::new(&id);
    job_record.push_execution(1000, 0, 1, 10, 12, (0, 5, 5), 32);
    let record = ExecutionRecord {
        phase: 2,
        instance: "func".to_string(),
        invocation_id: id,
        start_time: 1000 + i as i64,
        requested_duration: 10_000,
        ..Default::default()
    };
    (record, job_record)
}

async fn push_records(sink: &RecordSink, count: usize) {
    for i in 0..count {
        let (record, job_record) = make_records(i);
        sink.push(record, job_record).await;
    }
}

fn read_records(path: &Path) -> Vec<ExecutionRecord> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.deserialize().map(|r| r.unwrap()).collect()
}

fn read_job_records(path: &Path) -> Vec<JobExecutionRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_total_announced_after_records() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "knative", 1);
    let (collector, sink, total) = RecordCollector::create(&configuration).unwrap();
    let (duration_path, joblogs_path) = (collector.duration_path.clone(), collector.joblogs_path.clone());
    let handle = tokio::spawn(collector.collect());

    push_records(&sink, 5).await;
    total.send(5).unwrap();
    // the sink stays open, completion is detected from the counts alone
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(
        summary,
        CollectionSummary {
            records: 5,
            job_records: 5
        }
    );

    let records = read_records(&duration_path);
    assert_eq!(records.len(), 5);
    assert_eq!(records[0], make_records(0).0);
    let job_records = read_job_records(&joblogs_path);
    assert_eq!(job_records.len(), 5);
    assert_eq!(job_records[4], make_records(4).1);
    drop(sink);
}

#[tokio::test]
async fn test_total_announced_before_records() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "knative", 1);
    let (collector, sink, total) = RecordCollector::create(&configuration).unwrap();
    let duration_path = collector.duration_path.clone();
    let handle = tokio::spawn(collector.collect());

    total.send(5).unwrap();
    tokio::task::yield_now().await;
    assert!(!handle.is_finished());
    push_records(&sink, 5).await;
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.records, 5);
    assert_eq!(read_records(&duration_path).len(), 5);
}

#[tokio::test]
async fn test_closed_without_total() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "knative", 1);
    let (collector, sink, total) = RecordCollector::create(&configuration).unwrap();
    let handle = tokio::spawn(collector.collect());
    push_records(&sink, 3).await;
    drop(total);
    drop(sink);
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.job_records, 3);
}

#[tokio::test]
async fn test_closed_before_total_reached() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "knative", 1);
    let (collector, sink, total) = RecordCollector::create(&configuration).unwrap();
    let handle = tokio::spawn(collector.collect());
    push_records(&sink, 4).await;
    total.send(5).unwrap();
    drop(sink);
    let result = handle.await.unwrap();
    assert!(matches!(
        result,
        Err(LoaderError::IncompleteCollection {
            expected: 5,
            written: 4,
            job_written: 4
        })
    ));
}

#[tokio::test]
async fn test_output_names() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "elasticflow", 7);
    let (collector, _sink, _total) = RecordCollector::create(&configuration).unwrap();
    assert_eq!(
        collector.duration_path,
        dir.path().join("experiment_duration_7_ClientTraining_elasticflow.csv")
    );
    assert_eq!(
        collector.joblogs_path,
        dir.path().join("experiment_joblogs_7_ClientTraining_elasticflow.json")
    );
    assert!(collector.duration_path.exists());
}
