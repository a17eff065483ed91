// src/web/publisher.rs
use std::sync::Arc;

use log::{debug, info};

use crate::core::broadcast::Broadcaster;
use crate::core::channel::ClosableChannel;
use crate::types::{FragmentReady, Segment};

/// Moves ready fragments from the hand-off channel onto the broadcaster
/// until the channel closes, then closes the broadcaster. Returns the
/// number of published notifications.
pub fn run_publisher(
    fragments: ClosableChannel<Segment>,
    broadcaster: Arc<Broadcaster<FragmentReady>>,
) -> u64 {
    let mut published = 0u64;
    for fragment in &fragments {
        let ready = FragmentReady {
            segment_path: fragment.file_name(),
        };
        let viewers = broadcaster.publish(ready);
        published += 1;
        debug!(
            "[publisher] segment {} ({}) -> {} viewer(s)",
            fragment.index,
            fragment.file_name(),
            viewers
        );
    }

    broadcaster.close();
    info!("[publisher] stopped after {} notification(s)", published);
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SegmentKind;
    use std::path::PathBuf;

    #[test]
    fn test_each_viewer_gets_every_fragment_in_order() {
        let fragments = ClosableChannel::new("fragments");
        let bus = Broadcaster::new("live");
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        for i in 0..3 {
            fragments.put(Segment::new(
                i,
                SegmentKind::Fragment,
                PathBuf::from("/media").join(SegmentKind::Fragment.file_name(i)),
            ));
        }
        fragments.close();

        assert_eq!(run_publisher(fragments, bus.clone()), 3);
        assert_eq!(bus.published(), 3);
        assert!(bus.is_closed());

        for rx in [&mut a, &mut b] {
            let got: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
                .map(|r| r.segment_path)
                .collect();
            assert_eq!(got, vec!["segment_0.mp4", "segment_1.mp4", "segment_2.mp4"]);
        }
    }
}
