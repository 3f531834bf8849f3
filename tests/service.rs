mod common;

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use ett_marl::algorithms::Method;
use ett_marl::progress::{BroadcastSink, ProgressMessage};
use ett_marl::run::{ProblemRef, RunError};
use ett_marl::{generate_run_id, TrainingService};

use common::{setup, spacious, three_lessons};

/// The richest method this build can run.
fn learning_method() -> Method {
    Method::available().last().copied().unwrap_or(Method::Random)
}

fn drain(viewer: &mut tokio::sync::broadcast::Receiver<ProgressMessage>) -> Vec<ProgressMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = viewer.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_returns_immediately_with_a_started_response() {
    let sink = BroadcastSink::new(64);
    let service = TrainingService::new(setup(Method::Random, 1, 3), Arc::new(sink.clone()));
    let (response, handle) = service.start(Arc::new(three_lessons())).unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "started");
    assert_eq!(json["run_id"], handle.id().to_string());

    let report = handle.join().await.unwrap();
    assert_eq!(report.run_id, response.run_id);
    assert!(!report.outcome.cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_report_independently() {
    let sink = BroadcastSink::new(1024);
    let mut viewer = sink.subscribe();
    let service = TrainingService::new(setup(learning_method(), 2, 4), Arc::new(sink.clone()));

    let (_, first) = service.start(Arc::new(spacious(10))).unwrap();
    let (_, second) = service.start(Arc::new(three_lessons())).unwrap();
    assert_ne!(first.id(), second.id());
    let (a, b) = (first.join().await.unwrap(), second.join().await.unwrap());

    let mut per_run: HashMap<_, Vec<u32>> = HashMap::new();
    for message in drain(&mut viewer) {
        per_run.entry(message.run_id).or_default().push(message.event.epoch);
    }
    for report in [&a, &b] {
        assert_eq!(per_run[&report.run_id], vec![0, 1, 2, 3]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_a_run_keeps_the_event_stream_contiguous() {
    let sink = BroadcastSink::new(1024);
    let mut viewer = sink.subscribe();
    let mut long = setup(learning_method(), 3, 500);
    long.training.episodes_per_epoch = 1;
    let service = TrainingService::new(long, Arc::new(sink.clone()));

    let (_, handle) = service.start(Arc::new(spacious(20))).unwrap();
    handle.stop();
    let report = handle.join().await.unwrap();
    assert!(report.outcome.cancelled);

    let epochs: Vec<u32> = drain(&mut viewer).iter().map(|m| m.event.epoch).collect();
    let expected: Vec<u32> = (0..report.outcome.epochs.len() as u32).collect();
    assert_eq!(epochs, expected);
    assert!(epochs.len() < 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runs_load_instances_from_disk() {
    let dir = std::env::temp_dir().join(format!("ett-marl-it-{}", generate_run_id()));
    fs::create_dir_all(&dir).unwrap();
    let good = dir.join("good.json");
    fs::write(
        &good,
        serde_json::json!({
            "name": "good",
            "slots_per_day": 12, "n_days": 1, "n_weeks": 1,
            "rooms": [{"id": 1, "capacity": 10}],
            "time_slots": [{"id": 1, "days": "1", "weeks": "1", "start": 0, "length": 3}],
            "lessons": [{"id": 1, "duration": 3, "size": 5, "group": 1, "rooms": "any"}]
        })
        .to_string(),
    )
    .unwrap();
    let bad = dir.join("bad.json");
    fs::write(&bad, r#"{"name": "bad", "lessons": []}"#).unwrap();

    let service = TrainingService::new(setup(Method::Random, 0, 2), Arc::new(BroadcastSink::new(8)));
    let (_, ok) = service.start(ProblemRef::Path(good)).unwrap();
    let (_, failed) = service.start(ProblemRef::Path(bad)).unwrap();

    let report = ok.join().await.unwrap();
    assert_eq!(report.instance, "good");
    let best = report.outcome.best.as_ref().unwrap();
    assert_eq!(best.hard, 0);
    assert_eq!(best.records.len(), 1);
    assert!(matches!(failed.join().await, Err(RunError::Load(_))));

    let path = report_solution(&dir, &report);
    assert!(path.exists());
    fs::remove_dir_all(&dir).unwrap();
}

fn report_solution(dir: &std::path::Path, report: &ett_marl::run::RunReport) -> std::path::PathBuf {
    report.write_solution(&dir.join("output")).unwrap()
}
