use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Runs `routine` up to `attempts` times, sleeping `interval` between failed attempts.
/// The attempt number passed in starts at 0. Returns the last error when every attempt failed.
pub async fn retry<F, Fut, E>(label: &str, attempts: u64, interval: Duration, mut routine: F) -> Result<(), E>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut last_err = None;
    for attempt in 0..attempts {
        match routine(attempt).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                log::warn!("[{}]: {}/{}, error: {}", label, attempt + 1, attempts, err);
                last_err = Some(err);
                if attempt + 1 < attempts {
                    sleep(interval).await;
                }
            }
        }
    }

    match last_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_stops_on_first_success() {
        let calls = Cell::new(0);
        let out: Result<(), String> = retry("test", 5, Duration::from_millis(1), |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 2 {
                    Err(format!("attempt {}", attempt))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(out.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let out: Result<(), String> = retry("test", 3, Duration::from_millis(1), |attempt| async move {
            Err(format!("attempt {}", attempt))
        })
        .await;
        assert_eq!(out, Err("attempt 2".to_string()));
    }

    #[tokio::test]
    async fn test_zero_attempts_is_a_no_op() {
        let out: Result<(), String> =
            retry("test", 0, Duration::from_millis(1), |_| async { Err("never".to_string()) }).await;
        assert!(out.is_ok());
    }
}
