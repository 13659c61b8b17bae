use crate::comm::CommOps;
use crate::error::{CommError, CommResult};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Single PE communicator, messages can only be addressed to ourselves.
pub(crate) struct LocalComm {
    mailbox: Mutex<HashMap<usize, VecDeque<Vec<u8>>>>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalComm")
    }
}

impl LocalComm {
    pub(crate) fn new() -> LocalComm {
        LocalComm {
            mailbox: Mutex::new(HashMap::new()),
        }
    }
}

impl CommOps for LocalComm {
    fn my_pe(&self) -> usize {
        0
    }
    fn num_pes(&self) -> usize {
        1
    }
    fn send(&self, dst: usize, tag: usize, data: Vec<u8>) -> CommResult<()> {
        if dst != 0 {
            return Err(CommError::InvalidPe(dst));
        }
        self.mailbox.lock().entry(tag).or_default().push_back(data);
        Ok(())
    }
    fn recv(&self, src: usize, tag: usize) -> CommResult<Vec<u8>> {
        if src != 0 {
            return Err(CommError::InvalidPe(src));
        }
        let mut mailbox = self.mailbox.lock();
        let msg = mailbox.get_mut(&tag).and_then(|queue| queue.pop_front());
        if mailbox.get(&tag).map_or(false, |queue| queue.is_empty()) {
            mailbox.remove(&tag);
        }
        // nothing else can ever deliver to a single pe, a missing message is a deadlock
        msg.ok_or(CommError::Disconnected(src))
    }
}
