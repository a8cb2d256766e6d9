//! Driver behaviour against scripted components

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::fakes::{Journal, RecordingOpener, Script, ScriptedBackend, SharedJournal};
use super::fixtures;
use crate::config::TranscodeConfig;
use crate::error::ErrorKind;
use crate::pipeline::PipelineDriver;

fn driver(
    config: TranscodeConfig,
    script: Script,
    fail_write_at: Option<usize>,
) -> (PipelineDriver, SharedJournal) {
    let journal: SharedJournal = Arc::new(Mutex::new(Journal::default()));
    let driver = PipelineDriver::with_components(
        config,
        Box::new(ScriptedBackend {
            journal: journal.clone(),
            script,
        }),
        Box::new(RecordingOpener {
            journal: journal.clone(),
            fail_write_at,
        }),
    );
    (driver, journal)
}

fn tone(dir: &Path, frames: u32) -> PathBuf {
    let path = dir.join("in.wav");
    fixtures::write_sine_wav(&path, 16000, 1, frames);
    path
}

#[test]
fn test_happy_path_call_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 5000);
    let output = dir.path().join("out.m4a");

    let (driver, journal) = driver(TranscodeConfig::default(), Script::default(), None);
    let report = driver.run(&input, &output).unwrap();

    let j = journal.lock().unwrap();
    assert_eq!(j.configured, 1);
    assert_eq!(j.opened, vec![output.clone()]);
    assert_eq!(j.submitted_bytes, 10_000);
    assert_eq!(j.eos_submitted, 1);
    assert_eq!(j.add_track, 1);
    assert_eq!(j.start, 1);
    assert_eq!(j.finalize, 1);
    assert_eq!(j.abort, 0);
    assert_eq!(j.encoder_closed, 1);

    // 4 full frames plus the 904-frame tail
    assert_eq!(j.written_pts.len(), 5);
    assert!(j.written_pts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(report.access_units, 5);
    assert_eq!(report.encoder, "scripted-aac");
    assert!((report.encoded_duration_secs - 0.3125).abs() < 1e-6);
}

#[test]
fn test_input_timestamps_follow_sample_count() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 5000);

    let (driver, journal) = driver(TranscodeConfig::default(), Script::default(), None);
    driver.run(&input, &dir.path().join("out.m4a")).unwrap();

    // 2048-byte reads are 1024 frames = 64 ms; the last entry is the empty EOS submit
    let j = journal.lock().unwrap();
    assert_eq!(
        j.submitted_pts,
        vec![0, 64_000, 128_000, 192_000, 256_000, 312_500]
    );
}

#[test]
fn test_empty_data_region_finalizes_without_track() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 0);

    let (driver, journal) = driver(TranscodeConfig::default(), Script::default(), None);
    let report = driver.run(&input, &dir.path().join("out.m4a")).unwrap();

    let j = journal.lock().unwrap();
    assert_eq!(j.eos_submitted, 1);
    assert_eq!(j.add_track, 0);
    assert_eq!(j.finalize, 1);
    assert!(j.written_pts.is_empty());
    assert_eq!(report.access_units, 0);
}

#[test]
fn test_submit_failure_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 16000);
    let script = Script {
        fail_submit_at: Some(2),
        ..Default::default()
    };

    let (driver, journal) = driver(TranscodeConfig::default(), script, None);
    let err = driver.run(&input, &dir.path().join("out.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailure);

    let j = journal.lock().unwrap();
    assert_eq!(j.encoder_closed, 1);
    assert_eq!(j.abort, 1);
    assert_eq!(j.finalize, 0);
}

#[test]
fn test_write_failure_surfaces_mux_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 16000);

    let (driver, journal) = driver(TranscodeConfig::default(), Script::default(), Some(1));
    let err = driver.run(&input, &dir.path().join("out.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MuxError);

    let j = journal.lock().unwrap();
    assert_eq!(j.written_pts.len(), 1);
    assert_eq!(j.encoder_closed, 1);
    assert_eq!(j.abort, 1);
    assert_eq!(j.finalize, 0);
}

#[test]
fn test_encoder_unavailable_opens_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 1000);
    let script = Script {
        unavailable: true,
        ..Default::default()
    };

    let (driver, journal) = driver(TranscodeConfig::default(), script, None);
    let err = driver.run(&input, &dir.path().join("out.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncoderUnavailable);

    let j = journal.lock().unwrap();
    assert!(j.opened.is_empty());
    assert_eq!(j.abort, 0);
}

#[test]
fn test_missing_end_of_stream_trips_watchdog() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 3000);
    let config = TranscodeConfig {
        stall_timeout_ms: 50,
        ..Default::default()
    };
    let script = Script {
        never_finish: true,
        ..Default::default()
    };

    let (driver, journal) = driver(config, script, None);
    let err = driver.run(&input, &dir.path().join("out.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailure);
    assert!(err.to_string().contains("no encoder progress"));

    let j = journal.lock().unwrap();
    assert_eq!(j.eos_submitted, 1);
    assert_eq!(j.abort, 1);
    assert_eq!(j.encoder_closed, 1);
}

#[test]
fn test_withheld_slots_trip_watchdog() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 3000);
    let config = TranscodeConfig {
        stall_timeout_ms: 50,
        ..Default::default()
    };
    let script = Script {
        withhold_slots: true,
        ..Default::default()
    };

    let (driver, journal) = driver(config, script, None);
    let err = driver.run(&input, &dir.path().join("out.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailure);
    assert_eq!(journal.lock().unwrap().submitted_pts.len(), 0);
}

#[test]
fn test_bad_headers_fail_before_encoder() {
    let dir = tempfile::tempdir().unwrap();

    let garbage = dir.path().join("garbage.wav");
    std::fs::write(&garbage, b"not a riff file at all, just text padding").unwrap();
    let (d, journal) = driver(TranscodeConfig::default(), Script::default(), None);
    let err = d.run(&garbage, &dir.path().join("a.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedHeader);
    assert_eq!(journal.lock().unwrap().configured, 0);

    let deep = dir.path().join("24bit.wav");
    fixtures::write_raw_wav(&deep, 1, 16000, 24, &[0; 30]);
    let (d, journal) = driver(TranscodeConfig::default(), Script::default(), None);
    let err = d.run(&deep, &dir.path().join("b.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(journal.lock().unwrap().configured, 0);

    let surround = dir.path().join("6ch.wav");
    fixtures::write_raw_wav(&surround, 6, 16000, 16, &[0; 120]);
    let (d, journal) = driver(TranscodeConfig::default(), Script::default(), None);
    let err = d.run(&surround, &dir.path().join("c.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(journal.lock().unwrap().configured, 0);
}

#[test]
fn test_invalid_arguments_touch_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = tone(dir.path(), 100);

    let (d, journal) = driver(TranscodeConfig::default(), Script::default(), None);
    let err = d.run(&input, &input).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(journal.lock().unwrap().opened.is_empty());

    let config = TranscodeConfig {
        channel_count: 3,
        ..Default::default()
    };
    let (d, journal) = driver(config, Script::default(), None);
    let err = d.run(&input, &dir.path().join("out.m4a")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(journal.lock().unwrap().configured, 0);
}
