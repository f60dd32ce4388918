mod helpers;

use helpers::{memo_database, run_network_device, FakeDevice, TestResult};
use palmsync_lib::conduit::{read_database, ReadOptions};
use palmsync_lib::dlp::commands::{OpenConduit, SyncTermination};
use palmsync_lib::pdb::DatabaseEntries;
use palmsync_lib::session::recorder::{tap, Recorder, ReplayStream};
use palmsync_lib::session::shared_recorder;
use palmsync_lib::SyncSession;

/// The backup scenario: open conduit, enumerate, read MemoDB record by
/// record, close, end. Run once against the simulated device with the tap
/// recording, then replay the capture against a fresh session and demand
/// identical results.
#[tokio::test]
async fn backup_records_match_and_the_capture_replays() -> TestResult {
    let (host_stream, device_stream) = tokio::io::duplex(64 * 1024);
    let device = FakeDevice::new(vec![memo_database()]);
    let device_task = tokio::spawn(run_network_device(device_stream, device));

    let recorder = shared_recorder();
    let mut session = SyncSession::network(tap(host_stream, recorder.clone()));
    let backup = drive_backup(&mut session).await?;

    let device = device_task.await?;
    assert!(device.ended, "EndOfSync must reach the device");

    let DatabaseEntries::Records(records) = &backup.entries else {
        return Err("MemoDB is a record database".into());
    };
    assert_eq!(records.len(), 10);
    for (n, record) in records.iter().enumerate() {
        assert_eq!(record.payload, format!("Memo #{n}").into_bytes());
    }
    assert_eq!(backup.header.name, "MemoDB");
    assert_eq!(backup.header.creator.to_string(), "memo");

    // Round-trip the capture through its serialized form, then drive the
    // same call sequence against the replay.
    let json = recorder.lock().expect("recorder lock").to_json()?;
    let replay = ReplayStream::new(Recorder::from_json(&json)?);
    let mut replayed_session = SyncSession::network(Box::new(replay));
    let replayed = drive_backup(&mut replayed_session).await?;

    assert_eq!(replayed, backup, "replayed session must produce the same database");
    Ok(())
}

async fn drive_backup(session: &mut SyncSession) -> Result<palmsync_lib::Database, Box<dyn std::error::Error + Send + Sync>> {
    session.handshake().await?;
    session.start().await?;
    session.dlp().execute(&OpenConduit).await?;
    let sys_info = session.sys_info().cloned().ok_or("sys info cached by start()")?;
    let database =
        read_database(session.dlp(), &sys_info, "MemoDB", ReadOptions::default()).await?;
    session.end("backup finished", SyncTermination::Normal).await?;
    Ok(database)
}
