//! Poll-until-terminal loop for install validation jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::clock::PollClock;
use crate::client::CatalogService;
use crate::error::{CatalogError, Result};
use crate::model::{ValidationState, VersionLocator};

/// Interval between status fetches unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A change of job status observed between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: ValidationState,
    pub to: ValidationState,
}

/// Where polling ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub final_state: ValidationState,
    pub transitions: Vec<StatusTransition>,
    /// Status fetches performed.
    pub polls: usize,
    /// Message attached to the last fetched job, if any.
    pub message: Option<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.final_state == ValidationState::Valid
    }
}

/// Drives one validation job to a terminal state.
///
/// Each round sleeps one interval on the injected clock, then fetches the
/// job status. Polling stops at `valid`, `invalid` or `expired`, when the
/// optional deadline has passed, or when the cancel signal flips to `true`.
/// `invalid` and `expired` are outcomes here, not errors.
pub struct ValidationPoller {
    service: Arc<dyn CatalogService>,
    clock: Arc<dyn PollClock>,
    interval: Duration,
    deadline: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
}

enum Tick {
    Elapsed,
    Cancelled,
    SignalGone,
}

impl ValidationPoller {
    pub fn new(service: Arc<dyn CatalogService>, clock: Arc<dyn PollClock>) -> Self {
        Self {
            service,
            clock,
            interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Stop polling once `cancel` holds `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn poll_until_terminal(
        &self,
        locator: &VersionLocator,
        refresh_token: &str,
        observed: ValidationState,
    ) -> Result<ValidationOutcome> {
        let started = self.clock.now();
        let mut cancel = self.cancel.clone();
        let mut last = observed;
        let mut transitions = Vec::new();
        let mut polls = 0;

        loop {
            self.wait_tick(locator, &mut cancel).await?;

            let job = self
                .service
                .get_validation_status(locator, refresh_token)
                .await?;
            polls += 1;

            if job.state != last {
                info!(
                    locator = %locator,
                    from = %last,
                    to = %job.state,
                    "Validation status changed"
                );
                transitions.push(StatusTransition {
                    from: last,
                    to: job.state,
                });
                last = job.state;
            } else {
                debug!(locator = %locator, state = %last, polls, "Validation still pending");
            }

            if last.is_terminal() {
                return Ok(ValidationOutcome {
                    final_state: last,
                    transitions,
                    polls,
                    message: job.message,
                });
            }

            if let Some(deadline) = self.deadline {
                let waited = self.clock.now() - started;
                if waited >= deadline {
                    return Err(CatalogError::DeadlineExceeded {
                        locator: locator.to_string(),
                        waited_secs: waited.as_secs(),
                    });
                }
            }
        }
    }

    async fn wait_tick(
        &self,
        locator: &VersionLocator,
        cancel: &mut Option<watch::Receiver<bool>>,
    ) -> Result<()> {
        let tick = match cancel.as_mut() {
            None => {
                self.clock.sleep(self.interval).await;
                Tick::Elapsed
            }
            Some(rx) if *rx.borrow() => Tick::Cancelled,
            Some(rx) => tokio::select! {
                _ = self.clock.sleep(self.interval) => Tick::Elapsed,
                signalled = async { rx.wait_for(|cancelled| *cancelled).await.is_ok() } => {
                    if signalled { Tick::Cancelled } else { Tick::SignalGone }
                }
            },
        };

        match tick {
            Tick::Elapsed => Ok(()),
            Tick::Cancelled => {
                info!(locator = %locator, "Validation polling cancelled");
                Err(CatalogError::Cancelled(locator.to_string()))
            }
            Tick::SignalGone => {
                // Sender dropped without cancelling: poll unconditionally from now on.
                *cancel = None;
                self.clock.sleep(self.interval).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCatalogService;
    use crate::model::VersionRecord;
    use crate::validation::{ManualClock, TokioClock};
    use ValidationState::*;

    async fn seeded() -> (Arc<MockCatalogService>, VersionLocator) {
        let mock = Arc::new(MockCatalogService::new());
        mock.insert_offering("c1", "o1", vec![VersionRecord::new("c1", "o1", "v1")])
            .await;
        (mock, VersionLocator::new("c1", "v1"))
    }

    #[tokio::test]
    async fn test_terminates_after_three_fetches() {
        let (mock, locator) = seeded().await;
        mock.script_validation(&locator, vec![InProgress, InProgress, Valid])
            .await;
        let clock = Arc::new(ManualClock::new());
        let poller = ValidationPoller::new(mock.clone(), clock.clone());

        let outcome = poller
            .poll_until_terminal(&locator, "token", Empty)
            .await
            .unwrap();

        assert_eq!(outcome.final_state, Valid);
        assert_eq!(outcome.polls, 3);
        assert_eq!(mock.validation_status_calls(), 3);
        assert_eq!(
            outcome.transitions,
            vec![
                StatusTransition { from: Empty, to: InProgress },
                StatusTransition { from: InProgress, to: Valid },
            ]
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_failed_terminal_state_is_an_outcome() {
        let (mock, locator) = seeded().await;
        mock.script_validation(&locator, vec![InProgress, Expired]).await;
        let poller = ValidationPoller::new(mock.clone(), Arc::new(ManualClock::new()));

        let outcome = poller
            .poll_until_terminal(&locator, "token", InProgress)
            .await
            .unwrap();

        assert_eq!(outcome.final_state, Expired);
        assert!(!outcome.is_valid());
        assert_eq!(outcome.transitions.len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_stops_stalled_job() {
        let (mock, locator) = seeded().await;
        mock.script_validation(&locator, vec![InProgress]).await;
        let poller = ValidationPoller::new(mock.clone(), Arc::new(ManualClock::new()))
            .with_deadline(Some(Duration::from_secs(12)));

        let err = poller
            .poll_until_terminal(&locator, "token", InProgress)
            .await
            .unwrap_err();

        match err {
            CatalogError::DeadlineExceeded { waited_secs, .. } => assert_eq!(waited_secs, 15),
            other => panic!("expected deadline, got {other:?}"),
        }
        assert_eq!(mock.validation_status_calls(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let (mock, locator) = seeded().await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let poller =
            ValidationPoller::new(mock.clone(), Arc::new(ManualClock::new())).with_cancel(rx);

        let err = poller
            .poll_until_terminal(&locator, "token", InProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Cancelled(_)));
        assert_eq!(mock.validation_status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_waiting_poller() {
        let (mock, locator) = seeded().await;
        mock.script_validation(&locator, vec![InProgress]).await;
        let (tx, rx) = watch::channel(false);
        let poller = ValidationPoller::new(mock.clone(), Arc::new(TokioClock)).with_cancel(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            let _ = tx.send(true);
        });

        let err = poller
            .poll_until_terminal(&locator, "token", InProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Cancelled(_)));
        assert_eq!(mock.validation_status_calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_keeps_polling() {
        let (mock, locator) = seeded().await;
        mock.script_validation(&locator, vec![InProgress, Valid]).await;
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let poller =
            ValidationPoller::new(mock.clone(), Arc::new(ManualClock::new())).with_cancel(rx);

        let outcome = poller
            .poll_until_terminal(&locator, "token", InProgress)
            .await
            .unwrap();

        assert_eq!(outcome.final_state, Valid);
    }

    #[tokio::test]
    async fn test_status_errors_abort_polling() {
        let (mock, locator) = seeded().await;
        let poller = ValidationPoller::new(mock.clone(), Arc::new(ManualClock::new()));

        let err = poller
            .poll_until_terminal(&locator, "", InProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Auth(_)));
        assert_eq!(mock.validation_status_calls(), 1);
    }
}
