//! Install validation polling.
//!
//! A validation job moves `requested -> in_progress -> {valid | invalid |
//! expired}` on the catalog side. Submitting it does not wait; the
//! [`ValidationPoller`] then polls the job status on a [`PollClock`] until
//! it reaches one of the terminal states.

mod clock;
mod poller;

pub use clock::{ManualClock, PollClock, TokioClock};
pub use poller::{StatusTransition, ValidationOutcome, ValidationPoller, DEFAULT_POLL_INTERVAL};
