//! Clustered dispatch: whole request per pass
//!
//! Every segment of the fetched request is transferred in order, the sector
//! counts of the successful ones are summed, and the request is completed
//! once. A failing segment does not stop the pass; the completion carries the
//! first error together with the sectors that were moved.

use crate::queue::RequestQueue;
use crate::request::Completion;

use super::Target;

/// Run one dispatch iteration; returns `false` when the queue is empty
pub(crate) fn dispatch_one(queue: &RequestQueue, target: Target<'_>) -> bool {
    let Some(mut request) = queue.fetch() else {
        return false;
    };

    if !request.is_filesystem() {
        target.reject(request);
        return true;
    }

    let start = request.sector();
    let mut segments = request.take_segments();
    let mut sectors = 0u64;
    let mut result = Ok(());

    for segment in segments.iter_mut() {
        let span = target.span(segment);
        match target.transfer_segment(request.sector(), segment) {
            Ok(moved) => sectors += moved,
            Err(err) => {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        request.advance(span);
    }

    let completion = Completion {
        request: request.id(),
        sector: start,
        sectors,
        result,
        segments,
        finished: true,
    };
    target.complete(&mut request, completion);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::test_util::Fixture;
    use crate::request::{Request, RequestKind, Segment};
    use crate::status::BlockError;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_whole_request_in_one_pass() {
        let fixture = Fixture::new(16);
        let queue = RequestQueue::new();
        let (tx, rx) = unbounded();

        queue
            .push(
                Request::filesystem(1, 1)
                    .with_segment(Segment::write(vec![0x11u8; 512]))
                    .with_segment(Segment::write(vec![0x22u8; 1536]))
                    .with_channel(tx),
            )
            .unwrap();

        assert!(dispatch_one(&queue, fixture.target()));
        assert!(queue.is_empty());

        let completion = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(completion.sector, 1);
        assert_eq!(completion.sectors, 4);
        assert!(completion.finished);
        assert_eq!(completion.segments.len(), 2);

        let contents = fixture.contents();
        assert!(contents[512..1024].iter().all(|&b| b == 0x11));
        assert!(contents[1024..2560].iter().all(|&b| b == 0x22));
    }

    #[test]
    fn test_read_fills_segments() {
        let fixture = Fixture::new(8);
        fixture.store.write().as_mut().unwrap()[..1024].fill(0x7E);

        let queue = RequestQueue::new();
        let (tx, rx) = unbounded();
        queue
            .push(
                Request::filesystem(2, 0)
                    .with_segments([Segment::read(512), Segment::read(512)])
                    .with_channel(tx),
            )
            .unwrap();

        dispatch_one(&queue, fixture.target());
        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.sectors, 2);
        for segment in &completion.segments {
            assert!(segment.buf.iter().all(|&b| b == 0x7E));
        }
    }

    #[test]
    fn test_misaligned_segment_does_not_stop_pass() {
        let fixture = Fixture::new(4);
        let queue = RequestQueue::new();
        let (tx, rx) = unbounded();

        queue
            .push(
                Request::filesystem(7, 1)
                    .with_segment(Segment::write(vec![0x01u8; 100]))
                    .with_segment(Segment::write(vec![0xAAu8; 512]))
                    .with_channel(tx),
            )
            .unwrap();

        dispatch_one(&queue, fixture.target());
        let completion = rx.try_recv().unwrap();
        assert!(matches!(completion.result, Err(BlockError::InvalidArgument(_))));
        assert_eq!(completion.sectors, 1);
        assert!(completion.finished);

        let contents = fixture.contents();
        assert!(contents[..512].iter().all(|&b| b == 0));
        assert!(contents[512..1024].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_reports_first_failed_segment() {
        let fixture = Fixture::new(4);
        let queue = RequestQueue::new();
        let (tx, rx) = unbounded();

        queue
            .push(
                Request::filesystem(3, 2)
                    .with_segment(Segment::write(vec![5u8; 1024]))
                    .with_segment(Segment::write(vec![6u8; 512]))
                    .with_channel(tx),
            )
            .unwrap();

        dispatch_one(&queue, fixture.target());
        let completion = rx.try_recv().unwrap();
        assert!(matches!(completion.result, Err(BlockError::OutOfBounds { .. })));
        assert_eq!(completion.sectors, 2);
        assert_eq!(completion.segments.len(), 2);
        assert!(fixture.contents()[1024..2048].iter().all(|&b| b == 5));
    }

    #[test]
    fn test_rejects_non_fs_request() {
        let fixture = Fixture::new(4);
        let queue = RequestQueue::new();
        let (tx, rx) = unbounded();
        queue
            .push(Request::new(4, RequestKind::Other, 0).with_channel(tx))
            .unwrap();

        dispatch_one(&queue, fixture.target());
        assert_eq!(
            rx.try_recv().unwrap().result,
            Err(BlockError::UnsupportedRequestKind)
        );
    }
}
