//! End-to-end engine behavior over normalized exports

use std::sync::Arc;

use chrono::NaiveDate;
use ssa_common::config::Bucketing;
use ssa_common::flow::{FlowAvailability, FlowOptions};
use ssa_common::metrics::{Health, MetricValue, Rating, Window};
use ssa_common::normalize::{load_dataset, MemorySource};
use ssa_common::segments::Segment;
use ssa_common::{Dataset, EngineConfig, Snapshot};

fn snapshot(dataset: Dataset) -> Snapshot {
    Snapshot::new(Arc::new(dataset), Arc::new(EngineConfig::default()))
}

/// Weekly posts starting 2024-01-01; `opens(subscriber, post)` decides who opened
fn weekly_export(
    subscribers: usize,
    posts: usize,
    opens: impl Fn(usize, usize) -> bool,
) -> MemorySource {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut list = String::from("email,created_at\n");
    for s in 0..subscribers {
        list.push_str(&format!("s{:03}@example.com,2023-12-01\n", s));
    }

    let mut source = MemorySource::new().with_file("email_list.test.csv", list);
    let mut post_rows = String::from("post_id,post_date,title\n");
    for p in 0..posts {
        let day = start + chrono::Duration::days(7 * p as i64);
        post_rows.push_str(&format!("{}.post-{},{},Post {}\n", p + 1, p + 1, day, p + 1));

        let mut delivers = String::from("post_id,timestamp,email\n");
        let mut opened = String::from("post_id,timestamp,email\n");
        for s in 0..subscribers {
            delivers.push_str(&format!("{},{} 09:00:00,s{:03}@example.com\n", p + 1, day, s));
            if opens(s, p) {
                opened.push_str(&format!("{},{} 10:00:00,s{:03}@example.com\n", p + 1, day, s));
            }
        }
        source = source
            .with_file(&format!("posts/{}.delivers.csv", p + 1), delivers)
            .with_file(&format!("posts/{}.opens.csv", p + 1), opened);
    }
    source.with_file("posts.csv", post_rows)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_hundred_subscribers_fifty_deliveries_ten_opens() {
    let mut list = String::from("email,created_at\n");
    let mut delivers = String::from("post_id,timestamp,email\n");
    let mut opens = String::from("post_id,timestamp,email\n");
    for i in 0..100 {
        list.push_str(&format!("s{:03}@example.com,2024-01-01\n", i));
        if i < 50 {
            delivers.push_str(&format!("1,2024-02-01 09:00:00,s{:03}@example.com\n", i));
        }
        if i < 10 {
            opens.push_str(&format!("1,2024-02-01 11:00:00,s{:03}@example.com\n", i));
        }
    }
    let source = MemorySource::new()
        .with_file("email_list.csv", list)
        .with_file("posts.csv", "post_id,post_date,title\n1.only,2024-02-01,Only\n")
        .with_file("posts/1.delivers.csv", delivers)
        .with_file("posts/1.opens.csv", opens);
    let snap = snapshot(load_dataset(&source, "s1", "s1").unwrap());

    let report = snap.metrics(&Window::all_time());
    assert_eq!(report.open_rate.value, MetricValue::Number(0.2));
    assert_eq!(report.open_rate.rating, Rating::Average);
    assert_eq!(report.open_rate.health, Health::NeedsAttention);
}

#[test]
fn test_zero_posts_keeps_segmentation_working() {
    let source = MemorySource::new()
        .with_file(
            "email_list.csv",
            "email,created_at,email_disabled\na@x.com,2024-01-01,false\nb@x.com,2024-01-02,true\n",
        )
        .with_file("posts.csv", "post_id,title\n");
    let snap = snapshot(load_dataset(&source, "s2", "s2").unwrap());

    let report = snap.metrics(&Window::all_time());
    assert_eq!(report.open_rate.value, MetricValue::Undefined);
    assert_eq!(report.click_rate.value, MetricValue::Undefined);
    assert!(report.posts.posts.is_empty());

    let segments = snap.segments();
    assert_eq!(segments.total, 2);
    assert_eq!(segments.count(Segment::Normal), 1);
    assert_eq!(segments.count(Segment::Unsubscribed), 1);
}

#[test]
fn test_unopened_streak_moves_to_at_risk() {
    // s000 opens the first five of ten weekly posts
    let source = weekly_export(2, 10, |s, p| s == 1 || p < 5);
    let snap = snapshot(load_dataset(&source, "s3", "s3").unwrap());
    let segments = snap.segments();
    let reader = segments
        .assignments
        .iter()
        .find(|a| a.email == "s000@example.com")
        .unwrap();
    assert_eq!(reader.segment, Segment::AtRisk);

    // One more unopened post: still at-risk below the inactive threshold
    let source = weekly_export(2, 11, |s, p| s == 1 || p < 5);
    let snap = snapshot(load_dataset(&source, "s3b", "s3b").unwrap());
    let reader = snap
        .segments()
        .assignments
        .iter()
        .find(|a| a.email == "s000@example.com")
        .unwrap()
        .clone();
    assert_eq!(reader.segment, Segment::AtRisk);
    assert_eq!(reader.activity.consecutive_missed, 6);

    let loyal = snap
        .segments()
        .assignments
        .iter()
        .find(|a| a.email == "s001@example.com")
        .unwrap();
    assert_eq!(loyal.segment, Segment::SuperEngager);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_open_rate_bounded_in_every_window() {
    let source = weekly_export(20, 12, |s, p| (s + p) % 3 == 0);
    let snap = snapshot(load_dataset(&source, "p", "p").unwrap());
    let calc = snap.calculator();

    for month in 1..=4 {
        let start = NaiveDate::from_ymd_opt(2024, month, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, month, 28).unwrap();
        let window = Window::new(Some(start), Some(end)).unwrap();
        let tally = calc.tally(&window, None);
        match calc.open_rate(&window, None).value {
            MetricValue::Number(v) => assert!((0.0..=1.0).contains(&v)),
            MetricValue::Undefined => assert_eq!(tally.delivered, 0),
            MetricValue::Unavailable => panic!("open rate is never unavailable"),
        }
    }
}

#[test]
fn test_results_are_idempotent() {
    let source = weekly_export(15, 8, |s, p| s % 2 == 0 || p % 4 == 0);
    let first = snapshot(load_dataset(&source, "i", "i").unwrap());
    let second = snapshot(load_dataset(&source, "i", "i").unwrap());

    let window = Window::all_time();
    assert_eq!(
        serde_json::to_string(&first.metrics(&window)).unwrap(),
        serde_json::to_string(&second.metrics(&window)).unwrap()
    );
    assert_eq!(first.segments(), second.segments());
    assert_eq!(
        first.flow(&FlowOptions::default()),
        second.flow(&FlowOptions::default())
    );
}

#[test]
fn test_segments_exhaustive_in_every_bucket() {
    let source = weekly_export(12, 12, |s, p| p < s);
    let snap = snapshot(load_dataset(&source, "e", "e").unwrap());
    let options = FlowOptions {
        bucketing: Bucketing::Week,
        max_buckets: None,
    };
    let flow = snap.flow(&options);

    assert_eq!(flow.availability, FlowAvailability::Available);
    for bucket in &flow.buckets {
        let classified: usize = bucket.states.values().sum();
        assert_eq!(classified, bucket.present);
    }
}

#[test]
fn test_flow_conservation_per_bucket_pair() {
    let source = weekly_export(10, 12, |s, p| (s * p) % 5 != 1);
    let snap = snapshot(load_dataset(&source, "c", "c").unwrap());

    for bucketing in [Bucketing::Month, Bucketing::Week, Bucketing::Days { days: 10 }] {
        let flow = snap.flow(&FlowOptions {
            bucketing,
            max_buckets: None,
        });
        for pair in flow.buckets.windows(2) {
            let moved: usize = flow
                .transitions
                .iter()
                .filter(|t| t.bucket == pair[0].label && t.next_bucket == pair[1].label)
                .map(|t| t.count)
                .sum();
            assert_eq!(moved, pair[0].present, "{:?} {}", bucketing, pair[0].label);
        }
    }
}
