use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::config::AlignerParams;
use crate::registration::features::BriefMatcher;

/// Held for the duration of any pose solve or matcher inference.
static COMPUTE_GATE: Mutex<()> = Mutex::new(());

/// Matcher shared by every run in the process.
static MATCHER: Mutex<Option<Arc<BriefMatcher>>> = Mutex::new(None);

/// Acquire the process-wide compute gate. Only one solve or match runs at a time.
pub fn exclusive_compute() -> MutexGuard<'static, ()> {
    COMPUTE_GATE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The shared matcher for `params`, built on first use.
///
/// A request with different parameters replaces the cached instance.
pub fn shared_matcher(params: &AlignerParams) -> Arc<BriefMatcher> {
    // Clone the Arc so the slot is released before any matching happens
    let mut slot = MATCHER.lock().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(matcher) if matcher.params() == params => matcher.clone(),
        _ => {
            debug!("Initializing feature matcher (seed {:#x})", params.seed);
            let matcher = Arc::new(BriefMatcher::new(params.clone()));
            *slot = Some(matcher.clone());
            matcher
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_is_built_once_per_params() {
        let params = AlignerParams::default();
        let first = shared_matcher(&params);
        let again = shared_matcher(&params.clone());
        assert!(Arc::ptr_eq(&first, &again));

        let other = AlignerParams {
            seed: params.seed + 1,
            ..params.clone()
        };
        let replaced = shared_matcher(&other);
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert_eq!(replaced.params(), &other);
    }
}
