mod common;
use crate::common::recording_client::{drain_messages, RecordingClient};
use crate::common::{eventually, init_tracing, with_timeout};

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use jobtail::errors::JobtailError;
use jobtail::fs::mock::MockFileSystem;
use jobtail::fs::RealFileSystem;
use jobtail::hub::Hub;
use jobtail::job::{JobId, JobRegistry, JobState};

type TestResult = Result<(), Box<dyn Error>>;

fn real_registry(dir: &std::path::Path) -> JobRegistry {
    JobRegistry::new(dir, Arc::new(RealFileSystem))
}

async fn wait_terminal(registry: &JobRegistry, id: &JobId) -> JobState {
    let job = registry.get(id).expect("job is registered");
    let mut states = job.subscribe();
    let state = *with_timeout(states.wait_for(|s| s.is_terminal()))
        .await
        .expect("job state channel open");
    state
}

#[tokio::test]
async fn launched_job_is_listed_and_looked_up() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let registry = real_registry(dir.path());
    registry.prepare()?;

    let job = registry.launch("echo listed", None).await?;
    assert_eq!(registry.len(), 1);

    let record = registry.lookup(job.id())?;
    assert_eq!(record.command, "echo listed");
    assert!(record.live);

    assert_eq!(wait_terminal(&registry, job.id()).await, JobState::Completed);
    let log = registry.read_log(job.id())?;
    assert!(log.contains("listed\n"));

    let listed = registry.list();
    assert_eq!(listed.len(), 1, "in-memory job is not listed twice");
    assert_eq!(&listed[0].id, job.id());
    Ok(())
}

#[tokio::test]
async fn restarted_registry_rebuilds_records_from_logs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let (done, killed) = {
        let registry = real_registry(dir.path());
        let done = registry.launch("echo done", None).await?;
        let killed = registry.launch("sleep 5", None).await?;
        assert_eq!(wait_terminal(&registry, done.id()).await, JobState::Completed);
        assert!(registry.kill(killed.id())?);
        assert_eq!(wait_terminal(&registry, killed.id()).await, JobState::Killed);
        (done.id().clone(), killed.id().clone())
    };

    let registry = real_registry(dir.path());
    assert!(registry.is_empty());

    let record = registry.lookup(&done)?;
    assert_eq!(record.command, "echo done");
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(record.exit_code, Some(0));
    assert!(!record.live);

    let record = registry.lookup(&killed)?;
    assert_eq!(record.state, JobState::Killed, "killed status survives restart");

    let listed = registry.list();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, killed, "newest first");
    assert_eq!(listed[1].id, done);

    // Disk-only jobs are never running.
    assert!(!registry.kill(&done)?);
    Ok(())
}

#[test]
fn listing_from_mock_filesystem() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let log_dir = PathBuf::from("/var/jobtail/logs");

    let older = JobId::encode("make build", Utc.timestamp_opt(1_700_000_000, 0).unwrap())?;
    let newer = JobId::encode("make test", Utc.timestamp_opt(1_700_000_600, 0).unwrap())?;
    let legacy = JobId::encode("rsync -a src/ dst/", Utc.timestamp_opt(1_600_000_000, 0).unwrap())?;

    fs.add_file(
        log_dir.join(older.log_file_name()),
        "Start:2023-11-14T22:13:20Z\nCommand:make build\n\nok\n\nEnd:2023-11-14T22:14:00Z\nElapsed:40.000s\nExit:0\nStatus:completed\n",
    );
    fs.add_file(
        log_dir.join(newer.log_file_name()),
        "Start:2023-11-14T22:23:20Z\nCommand:make test\n\nrunning\n\nEnd:2023-11-14T22:23:30Z\nElapsed:10.000s\nStatus:killed\n",
    );
    // Written before footers carried a status.
    fs.add_file(
        log_dir.join(legacy.log_file_name()),
        "Start:2020-09-13T12:26:40Z\nCommand:rsync -a src/ dst/\n\nsent 12 bytes\n\nEnd:2020-09-13T12:26:41Z\nElapsed:1.000s\n",
    );
    fs.add_file(log_dir.join("notes.txt"), "not a job");
    fs.add_file(log_dir.join("!!!.out"), "not an id either");

    let registry = JobRegistry::new(&log_dir, Arc::new(fs.clone()));
    let listed = registry.list();

    let ids: Vec<&JobId> = listed.iter().map(|r| &r.id).collect();
    assert_eq!(ids, vec![&newer, &older, &legacy]);
    assert_eq!(listed[0].state, JobState::Killed);
    assert_eq!(listed[0].exit_code, None);
    assert_eq!(listed[1].state, JobState::Completed);
    assert_eq!(listed[1].exit_code, Some(0));
    assert_eq!(listed[2].state, JobState::Completed);
    assert_eq!(listed[2].command, "rsync -a src/ dst/");

    fs.remove_file(log_dir.join(older.log_file_name()));
    let err = registry.lookup(&older).err().expect("log is gone");
    assert!(matches!(err, JobtailError::NotFound(_)));
    assert!(registry.read_log(&older).err().is_some_and(|e| e.is_not_found()));
    Ok(())
}

#[test]
fn large_logs_are_summarised_from_their_ends() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let registry = real_registry(dir.path());

    let id = JobId::encode("yes | head -n 500000", Utc.timestamp_opt(1_700_000_000, 0).unwrap())?;
    let mut log = String::from("Start:2023-11-14T22:13:20Z\nCommand:yes | head -n 500000\n\n");
    log.push_str(&"y\n".repeat(500_000));
    log.push_str("\nEnd:2023-11-14T22:13:21Z\nElapsed:1.000s\nExit:0\nStatus:completed\n");
    std::fs::write(dir.path().join(id.log_file_name()), &log)?;

    let record = registry.lookup(&id)?;
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(record.exit_code, Some(0));
    assert!(record.started_at.is_some());
    assert!(record.ended_at.is_some());

    let listed = registry.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].exit_code, Some(0));

    // The full log is still available on request.
    assert_eq!(registry.read_log(&id)?.len(), log.len());
    Ok(())
}

#[tokio::test]
async fn unknown_jobs_are_not_found() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let registry = real_registry(dir.path());
    let ghost = JobId::encode("echo ghost", Utc::now())?;

    assert!(registry.lookup(&ghost).err().is_some_and(|e| e.is_not_found()));
    assert!(registry.kill(&ghost).err().is_some_and(|e| e.is_not_found()));
    assert!(registry.get(&ghost).is_none());
    Ok(())
}

#[tokio::test]
async fn empty_command_is_rejected_without_registering() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let registry = real_registry(dir.path());

    let err = registry.launch("  ", None).await.err().expect("empty command");
    assert!(matches!(err, JobtailError::InvalidArgument(_)));
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_start_stays_registered_as_failed() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let registry = real_registry(dir.path()).with_shell("/nonexistent/shell-binary");

    let err = registry.launch("echo hi", None).await.err().expect("spawn fails");
    assert!(matches!(err, JobtailError::Spawn { .. }));

    let listed = registry.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, JobState::Failed);
    assert!(listed[0].error.is_some());
    Ok(())
}

#[tokio::test]
async fn lifecycle_events_are_published_on_the_hub() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let hub = Hub::spawn();
    let (client, mut rx) = RecordingClient::new("observer", 16);
    hub.register(client.clone()).await?;

    let registry = real_registry(dir.path()).with_events(hub.clone());
    let job = registry.launch("echo event", None).await?;
    wait_terminal(&registry, job.id()).await;

    let mut actions = Vec::new();
    assert!(
        eventually(Duration::from_secs(2), || {
            actions.extend(drain_messages(&mut rx));
            actions.len() >= 2
        })
        .await
    );

    assert_eq!(actions[0].kind, "job");
    assert_eq!(actions[0].action, "started");
    assert_eq!(actions[0].text, job.id().as_str());
    assert_eq!(actions[1].action, "completed");
    let data = actions[1].data.as_ref().expect("record attached");
    assert_eq!(data["state"], "completed");
    assert_eq!(data["command"], "echo event");
    Ok(())
}

#[tokio::test]
async fn shutdown_kills_running_jobs_and_settles() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let registry = real_registry(dir.path());

    let a = registry.launch("sleep 5", None).await?;
    let b = registry.launch("sleep 6", None).await?;
    let done = registry.launch("true", None).await?;
    wait_terminal(&registry, done.id()).await;

    assert_eq!(registry.shutdown(), 2);
    assert!(registry.settle(Duration::from_secs(3)).await);
    assert_eq!(a.state(), JobState::Killed);
    assert_eq!(b.state(), JobState::Killed);

    let log = std::fs::read_to_string(a.log_path())?;
    assert!(log.trim_end().ends_with("Status:killed"));
    Ok(())
}
