//! Presentation edge: decides which failures the user sees.

use listgrid_engine::GridError;
use serde::Serialize;

/// With `lenient` set, failures are logged and replaced by an empty result,
/// the way an interactive grid keeps rendering. Otherwise they propagate.
pub fn settle<T: Default>(result: Result<T, GridError>, lenient: bool) -> Result<T, GridError> {
    match result {
        Err(e) if lenient => {
            tracing::warn!(kind = %e.kind(), error = %e, "suppressed, showing empty result");
            Ok(T::default())
        }
        other => other,
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), GridError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| GridError::Store(listgrid_api::StoreError::from(e)))?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use listgrid_api::StoreError;

    #[test]
    fn lenient_mode_swallows_failures() {
        let failed: Result<Vec<i32>, GridError> = Err(StoreError::transient("timeout").into());
        assert_eq!(settle(failed, true).unwrap(), Vec::<i32>::new());

        let failed: Result<Vec<i32>, GridError> = Err(StoreError::not_found("view").into());
        assert!(settle(failed, false).is_err());
        assert_eq!(settle(Ok(vec![1]), true).unwrap(), vec![1]);
    }
}
