//! Retry policy, kept apart from what is being retried.

use std::{future::Future, ops::ControlFlow};
use tokio::time;

/// Calls `attempt` every `interval` until it breaks or `deadline` passes.
///
/// An attempt may run longer than `interval`; only the deadline cuts it off, so this returns no
/// later than `deadline`. The next attempt starts `interval` after the previous one finished. The
/// first attempt is polled even if `deadline` has already passed.
///
/// When the deadline wins, returns the value of the last `Continue`, or `None` if no attempt
/// finished.
pub async fn poll_until<T, C, F, Fut>(
    interval: time::Duration,
    deadline: time::Instant,
    mut attempt: F,
) -> Result<T, Option<C>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T, C>>,
{
    let mut last = None;
    loop {
        match time::timeout_at(deadline, attempt()).await {
            Ok(ControlFlow::Break(value)) => return Ok(value),
            Ok(ControlFlow::Continue(c)) => last = Some(c),
            Err(_) => {
                tracing::debug!("Attempt cut off by the deadline");
                return Err(last);
            }
        }

        let now = time::Instant::now();
        if now >= deadline {
            return Err(last);
        }
        time::sleep_until(deadline.min(now + interval)).await;
    }
}
