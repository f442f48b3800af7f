use std::path::PathBuf;

use stepcast_captions::cues::CueBuilder;
use stepcast_captions::srt::{format_srt_time, generate_srt, write_captions};
use stepcast_timeline_model::{is_non_overlapping, retime_cues, StepTimeline};

fn load_fixture_timeline() -> StepTimeline {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("sample-recording")
        .join("steps.json");

    StepTimeline::load(path).expect("fixture timeline should load")
}

#[test]
fn fixture_timeline_resolves_to_expected_cues() {
    let timeline = load_fixture_timeline();
    let steps = timeline.relative_to_capture();
    let cues = CueBuilder::new(1.0, 0.1).unwrap().build(&steps).unwrap();

    let texts: Vec<&str> = cues.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Open the shop",
            "Search for \"blue mug\"",
            "Open cart",
            "Proceed to checkout",
            "Confirm order",
        ]
    );

    let expected = [(0.4, 1.2), (1.3, 2.9), (3.0, 4.0), (5.5, 8.0), (8.05, 9.05)];
    for (cue, (start, end)) in cues.iter().zip(expected) {
        assert!((cue.start - start).abs() < 1e-3, "{cue:?}");
        assert!((cue.end - end).abs() < 1e-3, "{cue:?}");
    }
    assert!(is_non_overlapping(&cues));
}

#[test]
fn fixture_srt_timestamps_stay_ordered_after_truncation() {
    let timeline = load_fixture_timeline();
    let cues = CueBuilder::new(1.0, 0.0)
        .unwrap()
        .build(&timeline.relative_to_capture())
        .unwrap();

    for speed in [1.0, 1.5, 3.0] {
        let retimed = retime_cues(&cues, speed);
        for pair in retimed.windows(2) {
            // Fixed-width timestamps compare lexicographically.
            assert!(format_srt_time(pair[0].end) <= format_srt_time(pair[1].start));
        }
    }

    let srt = generate_srt(&cues);
    assert_eq!(srt.matches(" --> ").count(), cues.len());
    assert!(srt.starts_with("1\n"));
}

#[test]
fn fixture_captions_round_trip_to_disk() {
    let timeline = load_fixture_timeline();
    let cues = CueBuilder::new(1.0, 0.1)
        .unwrap()
        .build(&timeline.relative_to_capture())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkout.srt");
    write_captions(&cues, &path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("\nConfirm order\n"));
    assert!(content.contains("5\n00:00:08,"));
}
