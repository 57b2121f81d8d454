use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use image::{GrayImage, RgbaImage};
use std::collections::VecDeque;

use exp_pace::ocr::engine::LEVEL_WHITELIST;
use exp_pace::ocr::{FieldRegions, PageMode, Preprocessor, RecognizeOptions, Recognizer};
use exp_pace::progress::{ExpTable, OutlierReason};
use exp_pace::session::{
    FrameSource, Ingest, Sampler, SamplerHandle, TickOutcome, Tracker, TrackerSettings, TrackerState,
};
use exp_pace::snapshot::{self, FileSnapshotStore, SnapshotStore};

/// Plays back one `(level text, exp text)` pair per tick.
struct ScriptedRecognizer {
    script: VecDeque<(&'static str, &'static str)>,
    current: (&'static str, &'static str),
}

impl Recognizer for ScriptedRecognizer {
    fn recognize(&mut self, _: &GrayImage, opts: RecognizeOptions<'_>) -> Result<String> {
        if opts.whitelist == Some(LEVEL_WHITELIST) {
            // A new tick starts with the first level attempt
            if opts.mode == PageMode::SingleLine {
                self.current = self.script.pop_front().unwrap_or(("", ""));
            }
            Ok(self.current.0.to_string())
        } else {
            Ok(self.current.1.to_string())
        }
    }
}

struct BlankFrames(usize);

impl FrameSource for BlankFrames {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        if self.0 == 0 {
            return Ok(None);
        }
        self.0 -= 1;
        Ok(Some(RgbaImage::new(320, 180)))
    }
}

fn table() -> ExpTable {
    ExpTable::from_pairs([(1, 1000), (2, 1500), (3, 2000)]).unwrap()
}

fn handle(script: &[(&'static str, &'static str)]) -> SamplerHandle {
    let sampler = Sampler::new(
        Preprocessor::default(),
        Box::new(ScriptedRecognizer {
            script: script.iter().copied().collect(),
            current: ("", ""),
        }),
        Box::new(BlankFrames(script.len())),
        FieldRegions::default(),
        1800,
    );
    SamplerHandle::new(sampler, Tracker::new(table(), TrackerSettings::default()))
}

fn at(t0: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    t0 + Duration::seconds(secs)
}

fn ingest(outcome: TickOutcome) -> Ingest {
    match outcome {
        TickOutcome::Ingested(ingest) => ingest,
        other => panic!("expected an ingested tick, got {:?}", other),
    }
}

#[test]
fn test_full_session_flow() {
    let h = handle(&[
        ("1", "900[90.00%]"),
        ("2", "200[13.33%]"),
        ("", "250[16.67%]"),
        ("4", "300[20.00%]"),
        ("2", "garbage"),
        ("2", "400[26.67%]"),
        ("2", "450[30.00%]"),
    ]);
    let t0 = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    h.start(t0);

    assert!(matches!(ingest(h.tick_at(at(t0, 1))), Ingest::Baseline(_)));
    assert!(matches!(ingest(h.tick_at(at(t0, 2))), Ingest::Accepted(_)));

    // Level tile unreadable: the previous level is assumed
    match ingest(h.tick_at(at(t0, 3))) {
        Ingest::Accepted(s) => assert_eq!(s.level, Some(2)),
        other => panic!("expected accepted, got {:?}", other),
    }

    match ingest(h.tick_at(at(t0, 4))) {
        Ingest::Outlier(s) => assert_eq!(s.outlier_reason, Some(OutlierReason::LevelJump)),
        other => panic!("expected outlier, got {:?}", other),
    }
    assert!(matches!(ingest(h.tick_at(at(t0, 5))), Ingest::Missing(_)));
    assert!(matches!(ingest(h.tick_at(at(t0, 6))), Ingest::Accepted(_)));

    let view = h.view(at(t0, 6));
    assert_eq!(view.cum_exp_value, 500.0);
    assert!((view.cum_exp_percent - 36.67).abs() < 1e-6);
    assert_eq!(view.history_len, 3);
    // The outlier never replaced the displayed reading
    assert_eq!(view.displayed.and_then(|s| s.level), Some(2));

    // Pause flushes one more tick before stopping the clock
    let flushed = h.pause(at(t0, 7));
    assert!(matches!(flushed, Some(TickOutcome::Ingested(Ingest::Accepted(_)))));
    assert_eq!(h.state(), TrackerState::Paused);

    let view = h.view(at(t0, 100));
    assert_eq!(view.cum_exp_value, 550.0);
    assert_eq!(view.elapsed_ms, 7000);

    let series = h.series();
    assert_eq!(series.cumulative.len(), 4);
    assert_eq!(series.cumulative.last().map(|p| p.value), Some(550.0));
    assert_eq!(series.overall.len(), 4);
    assert_eq!(h.tick_at(at(t0, 8)), TickOutcome::NoFrame);
}

#[test]
fn test_snapshot_survives_store_and_restore() {
    let h = handle(&[("1", "100[10.00%]"), ("1", "300[30.00%]"), ("1", "450[45.00%]")]);
    let t0 = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    h.start(t0);
    for i in 1..=3 {
        h.tick_at(at(t0, i));
    }

    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path());
    let snap = h.snapshot(at(t0, 3));
    snapshot::save_snapshot(&store, "run_1", &snap).unwrap();
    assert_eq!(store.list().unwrap(), vec!["run_1"]);

    let loaded = snapshot::load_snapshot(&store, "run_1").unwrap().unwrap();
    assert_eq!(loaded, snap);

    let restored = handle(&[("1", "500[50.00%]"), ("1", "600[60.00%]")]);
    restored.restore(loaded);
    assert_eq!(restored.state(), TrackerState::Paused);
    let view = restored.view(at(t0, 1000));
    assert_eq!(view.cum_exp_value, 350.0);
    assert_eq!(view.elapsed_ms, 3000);

    // Resume: fresh baseline, then progress continues from the restored totals
    restored.start(at(t0, 1000));
    assert!(matches!(ingest(restored.tick_at(at(t0, 1001))), Ingest::Baseline(_)));
    assert!(matches!(ingest(restored.tick_at(at(t0, 1002))), Ingest::Accepted(_)));
    let view = restored.view(at(t0, 1002));
    assert_eq!(view.cum_exp_value, 450.0);
    assert_eq!(view.elapsed_ms, 5000);
}

#[test]
fn test_legacy_snapshot_restores() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("old.json"),
        r#"{
            "savedAt": 1700000100000,
            "elapsedMs": 60000,
            "running": true,
            "cumExp": 1200,
            "cumPct": 80.5,
            "history": [[1700000090000, 1200, 80.5, 60000]]
        }"#,
    )
    .unwrap();
    let store = FileSnapshotStore::new(dir.path());
    let snap = snapshot::load_snapshot(&store, "old").unwrap().unwrap();
    assert_eq!(snap.version, snapshot::CURRENT_VERSION);

    let h = handle(&[]);
    h.restore(snap);
    let view = h.view(Utc::now());
    assert_eq!(h.state(), TrackerState::Paused);
    assert_eq!(view.elapsed_ms, 60_000);
    assert_eq!(view.cum_exp_value, 1200.0);
    assert_eq!(view.history_len, 1);
}
