//! Identifiers for refresh runs.
//!
//! Every refresh gets its own ULID so stored sets, log lines and metrics from
//! the same recompute can be joined. The process id groups all runs of one
//! scheduler instance.

use once_cell::sync::Lazy;
use ulid::Ulid;

static PROCESS_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Stable for the lifetime of the process.
#[inline]
pub fn process() -> &'static str {
    &PROCESS_ID
}

/// Fresh, time-ordered id for one refresh.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_is_stable() {
        assert_eq!(process(), process());
        assert_eq!(process().len(), 26);
    }

    #[test]
    fn run_ids_are_unique_and_time_ordered() {
        let older = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = generate();
        assert_ne!(older, newer);
        assert!(older < newer);
    }
}
