//! Runtime invariant checks with contract-test support
//!
//! Production code states its invariants with [`check_invariant!`]. Each
//! check is counted per thread, so a test can drive a scenario and then
//! assert that the invariants it cares about were actually evaluated.
//!
//! ```rust,ignore
//! use crabintrinsics::invariants::*;
//!
//! check_invariant!(attempt < max_attempts, "poll index stays below max_attempts");
//!
//! #[test]
//! fn contract_polling() {
//!     // ... run an acquisition ...
//!     contract_test("polling", &["poll index stays below max_attempts"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static INVARIANT_HITS: RefCell<HashMap<&'static str, usize>> = RefCell::new(HashMap::new());
}

/// Check an invariant and record that it was evaluated.
///
/// # Panics
/// Panics if the condition is false; a violated invariant is a logic bug.
#[macro_export]
macro_rules! check_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariants::__check_invariant_impl($condition, $message, module_path!())
    };
}

#[doc(hidden)]
pub fn __check_invariant_impl(condition: bool, message: &'static str, module: &str) {
    INVARIANT_HITS.with(|hits| {
        *hits.borrow_mut().entry(message).or_insert(0) += 1;
    });

    if !condition {
        panic!("INVARIANT VIOLATION [{}]: {}", module, message);
    }
}

/// How many times an invariant was evaluated on the current thread
pub fn invariant_hits(message: &str) -> usize {
    INVARIANT_HITS.with(|hits| hits.borrow().get(message).copied().unwrap_or(0))
}

/// Fail unless every listed invariant was evaluated at least once.
///
/// # Panics
/// Panics listing the invariants that were never checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| invariant_hits(invariant) == 0)
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

pub fn reset_invariant_log() {
    INVARIANT_HITS.with(|hits| hits.borrow_mut().clear());
}
