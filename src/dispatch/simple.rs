//! Simple dispatch: one segment per pass
//!
//! Each pass fetches the request at the head of the queue, transfers only its
//! current segment and completes that segment right away. A request with more
//! segments goes back to the head of the queue and is picked up again by the
//! next pass.

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

    let sector = request.sector();
    let Some(mut segment) = request.pop_segment() else {
        // Zero-length request
        let completion = Completion {
            request: request.id(),
            sector,
            sectors: 0,
            result: Ok(()),
            segments: Vec::new(),
            finished: true,
        };
        target.complete(&mut request, completion);
        return true;
    };

    let span = target.span(&segment);
    let result = target.transfer_segment(sector, &mut segment);
    request.advance(span);

    let finished = request.remaining_segments() == 0;
    let completion = Completion {
        request: request.id(),
        sector,
        sectors: result.unwrap_or(0),
        result: result.map(|_| ()),
        segments: vec![segment],
        finished,
    };
    target.complete(&mut request, completion);

    if !finished {
        queue.requeue_front(request);
    }
    true
}
