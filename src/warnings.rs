use std::sync::atomic::{AtomicBool, Ordering};

use crate::config;

static ENABLED: AtomicBool = AtomicBool::new(true);

pub(crate) enum RuntimeWarning<'a> {
    /// (collective name, seconds waited, pe that has not answered)
    CollectiveTimeout(&'a str, f64, usize),
}

impl<'a> RuntimeWarning<'a> {
    pub(crate) fn enable_warnings() {
        ENABLED.store(true, Ordering::Relaxed);
    }
    pub(crate) fn disable_warnings() {
        ENABLED.store(false, Ordering::Relaxed);
    }
    fn print_warning(&self) -> bool {
        if ENABLED.load(Ordering::Relaxed) {
            match self {
                RuntimeWarning::CollectiveTimeout(_, elapsed, _) => {
                    let enabled = config().deadlock_warning.unwrap_or(true);
                    enabled
                        && config().deadlock_timeout > 0.0
                        && *elapsed >= config().deadlock_timeout
                }
            }
        } else {
            false
        }
    }

    pub(crate) fn print(self) {
        #[cfg(not(feature = "disable-runtime-warnings"))]
        if self.print_warning() {
            match self {
                RuntimeWarning::CollectiveTimeout(name, elapsed, pe) => {
                    tracing::warn!(
                        collective = name,
                        waiting_on = pe,
                        elapsed,
                        "[DISTARRAY WARNING] potential deadlock detected. \
                        Collective operations require every pe of the group to issue the same calls in the same order. \
                        Note that reductions, indexing, reshape and collect_data are all collective. \
                        The deadlock timeout can be set via the DISTARRAY_DEADLOCK_TIMEOUT environment variable, \
                        set DISTARRAY_DEADLOCK_WARNING=false to disable this warning."
                    );
                }
            }
        }
    }
}
