//! Rotation scheduler
//!
//! The IntervalScheduler is responsible for:
//! - Sampling a wait from the plan's [`IntervalSpec`](crate::IntervalSpec)
//! - Suspending for that wait, interruptibly
//! - Triggering one rotation per cycle via a [`CircuitRotator`]
//! - Reporting each [`CircuitResult`] to the caller
//! - Stopping after `count` cycles, or on cancellation for unbounded plans
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────┐     ┌─────────┐ wait elapsed ┌──────────┐
//! │ Pending │────▶│ Waiting │─────────────▶│ Rotating │
//! └─────────┘     └─────────┘              └──────────┘
//!                      ▲                         │
//!                      └──── count not reached ──┤
//!                                                │ count reached
//!                   cancelled (any state)        ▼ or cancelled
//!                  ─────────────────────────▶┌──────┐
//!                                            │ Done │
//!                                            └──────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Check cancellation
//! 2. Sample wait, sleep (raced against cancellation)
//! 3. Check cancellation
//! 4. Rotate (raced against cancellation; a cancelled rotation is not reported)
//! 5. Hand the result to `on_result`

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RotationPlan;
use crate::switcher::{CircuitResult, CircuitRotator};

/// Where the scheduler is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, no plan running yet
    Pending,
    /// Suspended until the sampled wait elapses
    Waiting,
    /// A rotation is in flight
    Rotating,
    /// Plan finished or cancelled
    Done,
}

/// How a [`IntervalScheduler::run`] call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A finite plan ran all of its rotations
    Completed { rotations: u64 },
    /// Cancellation stopped the plan after this many reported rotations
    Cancelled { rotations: u64 },
}

impl RunOutcome {
    pub fn rotations(&self) -> u64 {
        match *self {
            RunOutcome::Completed { rotations } | RunOutcome::Cancelled { rotations } => rotations,
        }
    }
}

/// Drives repeated circuit rotations according to a [`RotationPlan`]
///
/// ## Threading
///
/// Cycles run strictly one after another on the caller's task. There is
/// never more than one rotation in flight, so the relay only ever reloads
/// one circuit at a time.
///
/// ## Cancellation
///
/// The wait and the rotation are both raced against the supplied
/// [`CancellationToken`], so an unbounded plan stops promptly instead of
/// finishing its current wait.
pub struct IntervalScheduler {
    /// Rotation implementation
    rotator: Box<dyn CircuitRotator>,

    /// Current state, observable via [`IntervalScheduler::subscribe`]
    state_tx: watch::Sender<SchedulerState>,
}

impl IntervalScheduler {
    /// Create a new scheduler in the `Pending` state
    pub fn new(rotator: Box<dyn CircuitRotator>) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Pending);
        Self { rotator, state_tx }
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Receive state transitions
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Run a plan with an entropy-seeded RNG
    ///
    /// # Parameters
    ///
    /// - `plan`: Interval and count; not modified
    /// - `cancel`: Stops the plan at the next suspension point
    /// - `on_result`: Called once per completed rotation, in order
    ///
    /// # Returns
    ///
    /// How the run ended and how many results were reported
    pub async fn run<F>(&self, plan: RotationPlan, cancel: CancellationToken, on_result: F) -> RunOutcome
    where
        F: FnMut(&CircuitResult) + Send,
    {
        let mut rng = StdRng::from_entropy();
        self.run_with_rng(plan, cancel, &mut rng, on_result).await
    }

    /// Run a plan with a caller-supplied RNG (deterministic tests)
    pub async fn run_with_rng<R, F>(
        &self,
        plan: RotationPlan,
        cancel: CancellationToken,
        rng: &mut R,
        mut on_result: F,
    ) -> RunOutcome
    where
        R: Rng + Send + ?Sized,
        F: FnMut(&CircuitResult) + Send,
    {
        info!(
            "Starting rotation plan (interval={}, count={})",
            plan.interval,
            if plan.is_unbounded() { "unbounded".to_string() } else { plan.count.to_string() }
        );

        let mut rotations: u64 = 0;

        let outcome = loop {
            if !plan.is_unbounded() && rotations >= u64::from(plan.count) {
                break RunOutcome::Completed { rotations };
            }
            if cancel.is_cancelled() {
                break RunOutcome::Cancelled { rotations };
            }

            let wait = plan.interval.sample(rng);
            self.set_state(SchedulerState::Waiting);
            debug!("Cycle {}: waiting {:?} before rotating", rotations + 1, wait);

            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(wait) => false,
            };
            if cancelled || cancel.is_cancelled() {
                break RunOutcome::Cancelled { rotations };
            }

            self.set_state(SchedulerState::Rotating);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.rotator.rotate() => Some(result),
            };
            let Some(result) = result else {
                debug!("Rotation abandoned on cancellation");
                break RunOutcome::Cancelled { rotations };
            };

            rotations += 1;
            debug!("Cycle {} finished (succeeded={})", rotations, result.succeeded);
            on_result(&result);
        };

        self.set_state(SchedulerState::Done);
        match outcome {
            RunOutcome::Completed { rotations } => info!("Rotation plan completed after {} rotation(s)", rotations),
            RunOutcome::Cancelled { rotations } => info!("Rotation plan cancelled after {} rotation(s)", rotations),
        }
        outcome
    }

    fn set_state(&self, state: SchedulerState) {
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntervalSpec;

    struct Unreachable;

    #[async_trait::async_trait]
    impl CircuitRotator for Unreachable {
        async fn rotate(&self) -> CircuitResult {
            CircuitResult::unresolved()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_results_are_still_reported() {
        let scheduler = IntervalScheduler::new(Box::new(Unreachable));
        let mut seen = Vec::new();
        let outcome = scheduler
            .run(RotationPlan::new(IntervalSpec::Fixed(1), 2), CancellationToken::new(), |r| {
                seen.push(r.succeeded)
            })
            .await;
        assert_eq!(outcome, RunOutcome::Completed { rotations: 2 });
        assert_eq!(seen, vec![false, false]);
        assert_eq!(scheduler.state(), SchedulerState::Done);
    }

    #[tokio::test]
    async fn test_precancelled_token_runs_nothing() {
        let scheduler = IntervalScheduler::new(Box::new(Unreachable));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;
        let outcome = scheduler
            .run(RotationPlan::new(IntervalSpec::Fixed(3600), 0), cancel, |_| calls += 1)
            .await;
        assert_eq!(outcome, RunOutcome::Cancelled { rotations: 0 });
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_new_scheduler_is_pending() {
        let scheduler = IntervalScheduler::new(Box::new(Unreachable));
        assert_eq!(scheduler.state(), SchedulerState::Pending);
    }
}
