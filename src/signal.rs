//! Cancellation tokens for requests.

use std::{rc::Rc, time::Duration};

use tokio::{sync::watch, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Aborted,
    TimedOut,
}

#[derive(Debug)]
struct SignalState {
    reason: watch::Sender<Option<AbortReason>>,
    deadline: Option<Instant>,
}

/// Cloneable; aborting any clone aborts them all.
#[derive(Debug, Clone)]
pub struct AbortSignal(Rc<SignalState>);

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::with_deadline(None)
    }

    /// A signal that aborts by itself `duration` from now. Needs the
    /// tokio time driver.
    pub fn timeout(duration: Duration) -> Self {
        Self::with_deadline(Some(Instant::now() + duration))
    }

    fn with_deadline(deadline: Option<Instant>) -> Self {
        let (reason, _) = watch::channel(None);
        AbortSignal(Rc::new(SignalState { reason, deadline }))
    }

    pub fn abort(&self) {
        if self.reason().is_none() {
            self.0.reason.send_replace(Some(AbortReason::Aborted));
        }
    }

    pub fn reason(&self) -> Option<AbortReason> {
        let current = *self.0.reason.borrow();
        if current.is_some() {
            return current
        }
        match self.0.deadline {
            Some(d) if Instant::now() >= d => {
                self.0.reason.send_replace(Some(AbortReason::TimedOut));
                Some(AbortReason::TimedOut)
            }
            _ => None
        }
    }

    pub fn aborted(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the signal is aborted or its deadline passed.
    pub async fn cancelled(&self) -> AbortReason {
        loop {
            // Subscribed before checking, so an abort() in between isn't lost.
            let mut changes = self.0.reason.subscribe();
            if let Some(r) = self.reason() {
                return r
            }
            match self.0.deadline {
                Some(deadline) => tokio::select! {
                    _ = changes.changed() => (),
                    _ = tokio::time::sleep_until(deadline) => (),
                },
                None => {
                    // The sender lives as long as self
                    let _ = changes.changed().await;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn t_timeout() {
        let s = AbortSignal::timeout(Duration::from_millis(50));
        assert!(! s.aborted());
        let start = Instant::now();
        assert_eq!(s.cancelled().await, AbortReason::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
        // an explicit abort after the deadline doesn't change the reason
        s.abort();
        assert_eq!(s.reason(), Some(AbortReason::TimedOut));
    }

    #[tokio::test]
    async fn t_abort_wakes_waiter() {
        let s = AbortSignal::new();
        let s2 = s.clone();
        let local = tokio::task::LocalSet::new();
        local.run_until(async move {
            let waiter = tokio::task::spawn_local(async move { s2.cancelled().await });
            tokio::task::yield_now().await;
            s.abort();
            assert_eq!(waiter.await.unwrap(), AbortReason::Aborted);
        }).await;
    }
}
