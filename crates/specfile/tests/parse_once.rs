//! Concurrent first access to a scan
//!
//! Kept in its own test binary: it installs a global subscriber to count
//! the warnings a scan logs while it is parsed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use specfile::{FileSpec, ScanId, ScanStatus};
use tempfile::tempdir;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

struct CountWarnings(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for CountWarnings {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Racing readers share one parse, so each issue is logged once
#[test]
fn test_scan_parsed_once_under_contention() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(CountWarnings(warnings.clone()));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("race.dat");
    std::fs::write(&path, "#O0 th  chi\n#S 1 ct\n#P0 1.0 oops\n#N 1\n#L s\n1\n").unwrap();
    let spec = FileSpec::open(&path).unwrap();
    assert_eq!(warnings.load(Ordering::SeqCst), 0);

    let readers = 8;
    let barrier = Barrier::new(readers);
    let (shared, gate) = (&spec, &barrier);
    let fetched: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..readers)
            .map(|_| {
                s.spawn(move || {
                    gate.wait();
                    shared.get_scan(ScanId::Number(1)).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(fetched.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(fetched[0].status, ScanStatus::Partial);
    assert_eq!(fetched[0].issues.len(), 1);
    assert_eq!(spec.cached(), 1);
    assert_eq!(warnings.load(Ordering::SeqCst), 1);

    spec.get_scan(ScanId::Position(0)).unwrap();
    assert_eq!(warnings.load(Ordering::SeqCst), 1);
}
