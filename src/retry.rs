use embedded_hal_async::delay::DelayNs;

/// Bounded number of attempts with a fixed pause after each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub delay_ms: u32,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u8, delay_ms: u32) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// Runs `action` until it succeeds or `max_attempts` failures have been seen.
    ///
    /// Every failed attempt, the last one included, is followed by `delay_ms`. The
    /// closure receives the 1-based attempt number. Returns the last error once the
    /// budget is spent; the caller decides when to try again.
    pub async fn run<D, T, E, F>(&self, delay: &mut D, mut action: F) -> Result<T, E>
    where
        D: DelayNs,
        F: AsyncFnMut(u8) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match action(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    delay.delay_ms(self.delay_ms).await;
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingDelay;
    use embassy_futures::block_on;

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(5, 5_000);
        let mut delay = RecordingDelay::default();
        let mut calls = 0;

        let result: Result<(), u8> = block_on(policy.run(&mut delay, async |attempt: u8| {
            calls += 1;
            Err(attempt)
        }));

        assert_eq!(result, Err(5));
        assert_eq!(calls, 5);
        assert_eq!(delay.waits_ms, std::vec![5_000; 5]);
    }

    #[test]
    fn stops_on_first_success() {
        let policy = RetryPolicy::new(20, 500);
        let mut delay = RecordingDelay::default();

        let result: Result<u8, ()> = block_on(policy.run(&mut delay, async |attempt: u8| {
            if attempt == 3 {
                Ok(attempt)
            } else {
                Err(())
            }
        }));

        assert_eq!(result, Ok(3));
        assert_eq!(delay.waits_ms, std::vec![500, 500]);
    }

    #[test]
    fn immediate_success_never_waits() {
        let policy = RetryPolicy::new(3, 100);
        let mut delay = RecordingDelay::default();

        let result: Result<&str, ()> = block_on(policy.run(&mut delay, async |_: u8| Ok("up")));

        assert_eq!(result, Ok("up"));
        assert!(delay.waits_ms.is_empty());
    }
}
