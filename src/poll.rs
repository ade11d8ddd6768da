//! Bounded polling shared by every wait in the automation.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

/// Result of one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick<T> {
    Ready(T),
    Pending,
}

/// Run `tick` immediately and then every `policy.interval` until it returns
/// `Tick::Ready` or `policy.deadline` has elapsed. Returns `None` on timeout.
///
/// A tick that starts before the deadline always completes and is honoured, so
/// the last observation is never discarded.
pub async fn bounded_poll<T, F, Fut>(policy: PollPolicy, mut tick: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Tick<T>>,
{
    let start = Instant::now();
    let mut round: u32 = 0;
    loop {
        round += 1;
        if let Tick::Ready(value) = tick(round).await {
            return Some(value);
        }
        if start.elapsed() + policy.interval > policy.deadline {
            return None;
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Poll a boolean predicate; `true` once it holds, `false` on timeout.
pub async fn poll_until<F, Fut>(policy: PollPolicy, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    bounded_poll(policy, |_| {
        let fut = predicate();
        async move {
            if fut.await {
                Tick::Ready(())
            } else {
                Tick::Pending
            }
        }
    })
    .await
    .is_some()
}
