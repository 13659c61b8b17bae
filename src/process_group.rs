use crate::array::{Dist, Element, ReduceOp};
use crate::barrier::Barrier;
use crate::comm::{Backend, Comm, CommOps};
use crate::error::{CommError, CommResult};

use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed group of cooperating PEs and the collectives they can issue together.
///
/// Every method here that takes `&self` and talks to other PEs is a **collective**:
/// all PEs of the group must call it, in the same order, with compatible arguments.
/// Messages of a collective are matched on the sender and on a sequence number that
/// each PE advances identically, so a PE that skips or reorders a collective will
/// deadlock the group (a warning is printed after `DISTARRAY_DEADLOCK_TIMEOUT` seconds).
pub struct ProcessGroup {
    comm: Comm,
    my_pe: usize,
    num_pes: usize,
    collective_cnt: AtomicUsize,
    barrier: Barrier,
}

impl std::fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("my_pe", &self.my_pe)
            .field("num_pes", &self.num_pes)
            .field("comm", &self.comm)
            .finish()
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> CommResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> CommResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

impl ProcessGroup {
    pub(crate) fn new(comm: Comm) -> ProcessGroup {
        let my_pe = comm.my_pe();
        let num_pes = comm.num_pes();
        ProcessGroup {
            comm,
            my_pe,
            num_pes,
            collective_cnt: AtomicUsize::new(0),
            barrier: Barrier::new(my_pe, num_pes),
        }
    }

    /// Return the id of this PE within the group (roughly equivalent to an MPI rank)
    pub fn my_pe(&self) -> usize {
        self.my_pe
    }

    /// Return the number of PEs in the group
    pub fn num_pes(&self) -> usize {
        self.num_pes
    }

    pub fn backend(&self) -> Backend {
        self.comm.backend()
    }

    fn next_tag(&self) -> usize {
        self.collective_cnt.fetch_add(1, Ordering::SeqCst)
    }

    fn send_to<T: serde::Serialize + ?Sized>(&self, dst: usize, tag: usize, value: &T) -> CommResult<()> {
        self.comm.send(dst, tag, encode(value)?)
    }

    fn recv_from<T: serde::de::DeserializeOwned>(&self, src: usize, tag: usize) -> CommResult<T> {
        decode(&self.comm.recv(src, tag)?)
    }

    /// Send `value` to every other PE, then receive every PE's value, in rank order.
    fn exchange<T: Dist>(&self, tag: usize, value: &T) -> CommResult<Vec<T>> {
        for pe in (0..self.num_pes).filter(|pe| *pe != self.my_pe) {
            self.send_to(pe, tag, value)?;
        }
        let mut gathered = Vec::with_capacity(self.num_pes);
        for pe in 0..self.num_pes {
            if pe == self.my_pe {
                gathered.push(value.clone());
            } else {
                gathered.push(self.recv_from(pe, tag)?);
            }
        }
        Ok(gathered)
    }

    /// Block until every PE of the group has entered the barrier.
    ///
    /// This is a collective operation.
    #[tracing::instrument(skip_all)]
    pub fn barrier(&self) -> CommResult<()> {
        self.barrier.barrier(&self.comm, &self.collective_cnt)
    }

    /// Every PE receives the value provided by `root`, the values passed on other PEs are ignored.
    ///
    /// This is a collective operation.
    pub fn broadcast<T: Dist>(&self, value: &T, root: usize) -> CommResult<T> {
        if root >= self.num_pes {
            return Err(CommError::InvalidPe(root));
        }
        let tag = self.next_tag();
        if self.my_pe == root {
            for pe in (0..self.num_pes).filter(|pe| *pe != root) {
                self.send_to(pe, tag, value)?;
            }
            Ok(value.clone())
        } else {
            self.recv_from(root, tag)
        }
    }

    /// `root` splits `data` into consecutive chunks of `counts[pe]` elements, PE `pe` receives chunk `pe`.
    ///
    /// `data` is only read on `root`. This is a collective operation.
    pub fn scatter_v<T: Dist>(&self, data: &[T], counts: &[usize], root: usize) -> CommResult<Vec<T>> {
        if root >= self.num_pes {
            return Err(CommError::InvalidPe(root));
        }
        if counts.len() != self.num_pes {
            return Err(CommError::CountMismatch {
                pe: self.my_pe,
                expected: self.num_pes,
                received: counts.len(),
            });
        }
        let tag = self.next_tag();
        if self.my_pe == root {
            let total: usize = counts.iter().sum();
            if data.len() != total {
                return Err(CommError::CountMismatch {
                    pe: root,
                    expected: total,
                    received: data.len(),
                });
            }
            let mut mine = Vec::new();
            let mut offset = 0;
            for (pe, cnt) in counts.iter().enumerate() {
                let chunk = &data[offset..offset + cnt];
                if pe == root {
                    mine = chunk.to_vec();
                } else {
                    self.send_to(pe, tag, chunk)?;
                }
                offset += cnt;
            }
            Ok(mine)
        } else {
            let chunk: Vec<T> = self.recv_from(root, tag)?;
            if chunk.len() != counts[self.my_pe] {
                return Err(CommError::CountMismatch {
                    pe: root,
                    expected: counts[self.my_pe],
                    received: chunk.len(),
                });
            }
            Ok(chunk)
        }
    }

    /// Gather one value from every PE, returned on every PE in rank order.
    ///
    /// This is a collective operation.
    pub fn all_gather<T: Dist>(&self, value: &T) -> CommResult<Vec<T>> {
        let tag = self.next_tag();
        self.exchange(tag, value)
    }

    /// Combine equally sized buffers element-wise with `op`, every PE receives the identical result.
    ///
    /// Contributions are folded in rank order on every PE so floating point results are bitwise identical.
    /// This is a collective operation.
    pub fn all_reduce<T: Element>(&self, local: &[T], op: ReduceOp) -> CommResult<Vec<T>> {
        let tag = self.next_tag();
        let contributions = self.exchange(tag, &local.to_vec())?;
        let mut result = vec![op.identity::<T>(); local.len()];
        for (pe, contribution) in contributions.iter().enumerate() {
            if contribution.len() != local.len() {
                return Err(CommError::CountMismatch {
                    pe,
                    expected: local.len(),
                    received: contribution.len(),
                });
            }
            for (acc, val) in result.iter_mut().zip(contribution) {
                *acc = op.combine(*acc, *val);
            }
        }
        tracing::trace!(pe = self.my_pe, ?op, len = local.len(), "all_reduce");
        Ok(result)
    }

    /// Single value convenience wrapper around [ProcessGroup::all_reduce]
    ///
    /// This is a collective operation.
    pub fn all_reduce_scalar<T: Element>(&self, value: T, op: ReduceOp) -> CommResult<T> {
        let reduced = self.all_reduce(&[value], op)?;
        Ok(reduced[0])
    }

    /// Exclusive prefix sum across PEs: PE `i` receives the sum of the values of PEs `0..i`, PE 0 receives 0.
    ///
    /// This is a collective operation.
    pub fn exscan_sum(&self, value: usize) -> CommResult<usize> {
        let tag = self.next_tag();
        for pe in (self.my_pe + 1)..self.num_pes {
            self.send_to(pe, tag, &value)?;
        }
        let mut prefix = 0;
        for pe in 0..self.my_pe {
            prefix += self.recv_from::<usize>(pe, tag)?;
        }
        Ok(prefix)
    }

    /// Concatenate differently sized contributions into one buffer of `total` elements that is identical on every PE.
    ///
    /// Each PE's `local` buffer is placed at its displacement `displ` (typically obtained from
    /// [ProcessGroup::exscan_sum] of the local counts). This is a collective operation.
    pub fn all_gather_v<T: Dist>(&self, local: &[T], displ: usize, total: usize) -> CommResult<Vec<T>> {
        let tag = self.next_tag();
        let pieces = self.exchange(tag, &(displ, local.to_vec()))?;
        let mut slots: Vec<Option<T>> = vec![None; total];
        for (pe, (displ, piece)) in pieces.into_iter().enumerate() {
            if displ + piece.len() > total {
                return Err(CommError::CountMismatch {
                    pe,
                    expected: total.saturating_sub(displ),
                    received: piece.len(),
                });
            }
            for (slot, elem) in slots[displ..displ + piece.len()].iter_mut().zip(piece) {
                *slot = Some(elem);
            }
        }
        let filled = slots.iter().filter(|slot| slot.is_some()).count();
        if filled != total {
            return Err(CommError::CountMismatch {
                pe: self.my_pe,
                expected: total,
                received: filled,
            });
        }
        tracing::trace!(pe = self.my_pe, displ, total, "all_gather_v");
        Ok(slots.into_iter().flatten().collect())
    }

    /// Every PE sends `send_counts[pe]` consecutive elements of `send` to PE `pe`, and receives
    /// `recv_counts[pe]` elements from PE `pe`; the received chunks are concatenated in rank order.
    ///
    /// Both count vectors must agree pairwise across PEs. This is a collective operation.
    pub fn all_to_all_v<T: Dist>(
        &self,
        send: &[T],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> CommResult<Vec<T>> {
        let expected: usize = send_counts.iter().sum();
        if send_counts.len() != self.num_pes
            || recv_counts.len() != self.num_pes
            || expected != send.len()
        {
            return Err(CommError::CountMismatch {
                pe: self.my_pe,
                expected,
                received: send.len(),
            });
        }
        let tag = self.next_tag();
        let mut offset = 0;
        let mut mine: &[T] = &[];
        for (pe, cnt) in send_counts.iter().enumerate() {
            let chunk = &send[offset..offset + cnt];
            if pe == self.my_pe {
                mine = chunk;
            } else {
                self.send_to(pe, tag, chunk)?;
            }
            offset += cnt;
        }
        let mut received = Vec::with_capacity(recv_counts.iter().sum());
        for (pe, cnt) in recv_counts.iter().enumerate() {
            let chunk: Vec<T> = if pe == self.my_pe {
                mine.to_vec()
            } else {
                self.recv_from(pe, tag)?
            };
            if chunk.len() != *cnt {
                return Err(CommError::CountMismatch {
                    pe,
                    expected: *cnt,
                    received: chunk.len(),
                });
            }
            received.extend(chunk);
        }
        tracing::trace!(pe = self.my_pe, sent = send.len(), received = received.len(), "all_to_all_v");
        Ok(received)
    }
}
