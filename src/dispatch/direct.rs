//! Direct dispatch: no request queue
//!
//! Each unit of work is transferred synchronously on the submitter's thread
//! and its status is returned immediately. Multi-segment requests are split
//! into one [`Bio`] per segment by the submit path.

use crate::request::{Bio, Completion, Request};
use crate::status::BlockError;

use super::Target;

/// Transfer a single bio, returning the sectors moved
pub(crate) fn make_request(target: Target<'_>, bio: &mut Bio) -> Result<u64, BlockError> {
    target.transfer(bio.sector, &mut bio.buf, bio.direction)
}

/// Resolve a whole request without queuing it, completing each segment as it
/// is transferred
pub(crate) fn submit(target: Target<'_>, mut request: Request) {
    if !request.is_filesystem() {
        target.reject(request);
        return;
    }

    if request.remaining_segments() == 0 {
        let completion = Completion {
            request: request.id(),
            sector: request.sector(),
            sectors: 0,
            result: Ok(()),
            segments: Vec::new(),
            finished: true,
        };
        target.complete(&mut request, completion);
        return;
    }

    while let Some(segment) = request.pop_segment() {
        let sector = request.sector();
        let span = target.span(&segment);
        let mut bio = Bio::from_segment(sector, segment);
        let result = make_request(target, &mut bio);
        request.advance(span);

        let completion = Completion {
            request: request.id(),
            sector,
            sectors: result.unwrap_or(0),
            result: result.map(|_| ()),
            segments: vec![bio.into_segment()],
            finished: request.remaining_segments() == 0,
        };
        target.complete(&mut request, completion);
    }
}
