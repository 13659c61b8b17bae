use crate::comm::{Comm, CommOps};
use crate::config;
use crate::error::CommResult;

use std::sync::atomic::{AtomicUsize, Ordering};

/// n-way dissemination barrier built on point to point messages.
///
/// In round `r` every pe signals the pes `j * factor^r` ahead of it (for `j` in `1..factor`)
/// and waits on the pes the same distance behind it, after `ceil(log_factor(num_pes))`
/// rounds every pe has transitively heard from every other pe.
pub(crate) struct Barrier {
    my_pe: usize,
    num_pes: usize,
    factor: usize,
    barrier_cnt: AtomicUsize,
}

impl Barrier {
    pub(crate) fn new(my_pe: usize, num_pes: usize) -> Barrier {
        Barrier {
            my_pe,
            num_pes,
            factor: config().barrier_dissemination_factor.max(2),
            barrier_cnt: AtomicUsize::new(0),
        }
    }

    pub(crate) fn barrier(&self, comm: &Comm, tags: &AtomicUsize) -> CommResult<()> {
        let barrier_id = self.barrier_cnt.fetch_add(1, Ordering::SeqCst);
        if self.num_pes <= 1 {
            return Ok(());
        }
        tracing::trace!(pe = self.my_pe, barrier_id, "entering barrier");
        let mut distance = 1;
        while distance < self.num_pes {
            let tag = tags.fetch_add(1, Ordering::SeqCst);
            for j in 1..self.factor {
                let offset = j * distance;
                if offset >= self.num_pes {
                    break;
                }
                comm.send((self.my_pe + offset) % self.num_pes, tag, Vec::new())?;
            }
            for j in 1..self.factor {
                let offset = j * distance;
                if offset >= self.num_pes {
                    break;
                }
                comm.recv((self.my_pe + self.num_pes - offset) % self.num_pes, tag)?;
            }
            distance *= self.factor;
        }
        tracing::trace!(pe = self.my_pe, barrier_id, "leaving barrier");
        Ok(())
    }
}
