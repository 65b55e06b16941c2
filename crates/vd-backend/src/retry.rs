use std::thread;
use std::time::Duration;

use crate::BackendError;

/// Retry `f` while it returns a transient [`BackendError`], up to
/// `params.retries` additional attempts, sleeping `backoff` between tries.
/// Permanent errors propagate immediately (spec §7: "Callers see a
/// structured error kind").
pub fn with_retry<T>(
    retries: u32,
    backoff: Duration,
    mut f: impl FnMut() -> Result<T, BackendError>,
) -> Result<T, BackendError> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < retries => {
                log::debug!("transient backend error on attempt {attempt}: {e}, retrying");
                attempt += 1;
                thread::sleep(backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn retries_transient_then_succeeds() {
        let calls = Cell::new(0);
        let result = with_retry(5, Duration::from_millis(0), || {
            let n = calls.get();
            calls.set(n + 1);
            if n < 2 {
                Err(BackendError::Transient("slow down".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_on_permanent_error() {
        let calls = Cell::new(0);
        let result = with_retry(5, Duration::from_millis(0), || {
            calls.set(calls.get() + 1);
            Err::<(), _>(BackendError::NotFound {
                namespace: "ns".into(),
                name: "obj".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn stops_after_retry_budget_exhausted() {
        let calls = Cell::new(0);
        let result = with_retry(2, Duration::from_millis(0), || {
            calls.set(calls.get() + 1);
            Err::<(), _>(BackendError::Transient("still slow".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }
}
