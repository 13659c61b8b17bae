use crate::comm::CommOps;
use crate::config;
use crate::error::{CommError, CommResult};
use crate::warnings::RuntimeWarning;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

enum Envelope {
    Data {
        src: usize,
        tag: usize,
        data: Vec<u8>,
    },
    Abort(usize),
}

/// A communicator for one PE of a group whose PEs live on separate threads.
///
/// PEs never share buffers: every payload is a serialized byte vector moved through a
/// channel, the receiving PE owns what it deserializes.
pub(crate) struct ChannelComm {
    my_pe: usize,
    num_pes: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: Mutex<HashMap<(usize, usize), VecDeque<Vec<u8>>>>,
    aborted: Mutex<Option<usize>>,
}

impl std::fmt::Debug for ChannelComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelComm {{ pe: {} of {} }}", self.my_pe, self.num_pes)
    }
}

impl ChannelComm {
    pub(crate) fn create_group(num_pes: usize) -> Vec<ChannelComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..num_pes).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(pe, inbox)| ChannelComm {
                my_pe: pe,
                num_pes,
                peers: senders.clone(),
                inbox,
                stash: Mutex::new(HashMap::new()),
                aborted: Mutex::new(None),
            })
            .collect()
    }

    fn take_stashed(&self, src: usize, tag: usize) -> Option<Vec<u8>> {
        let mut stash = self.stash.lock();
        let msg = stash.get_mut(&(src, tag)).and_then(|queue| queue.pop_front());
        if stash.get(&(src, tag)).map_or(false, |queue| queue.is_empty()) {
            stash.remove(&(src, tag));
        }
        msg
    }
}

impl CommOps for ChannelComm {
    fn my_pe(&self) -> usize {
        self.my_pe
    }
    fn num_pes(&self) -> usize {
        self.num_pes
    }

    fn send(&self, dst: usize, tag: usize, data: Vec<u8>) -> CommResult<()> {
        let peer = self.peers.get(dst).ok_or(CommError::InvalidPe(dst))?;
        peer.send(Envelope::Data {
            src: self.my_pe,
            tag,
            data,
        })
        .map_err(|_| CommError::Disconnected(dst))
    }

    fn recv(&self, src: usize, tag: usize) -> CommResult<Vec<u8>> {
        if src >= self.num_pes {
            return Err(CommError::InvalidPe(src));
        }
        if let Some(data) = self.take_stashed(src, tag) {
            return Ok(data);
        }
        if let Some(pe) = *self.aborted.lock() {
            return Err(CommError::PeerAborted(pe));
        }
        let timeout = Duration::from_secs_f64(config().deadlock_timeout.max(1.0));
        let start = Instant::now();
        loop {
            match self.inbox.recv_timeout(timeout) {
                Ok(Envelope::Data {
                    src: msg_src,
                    tag: msg_tag,
                    data,
                }) => {
                    if msg_src == src && msg_tag == tag {
                        return Ok(data);
                    }
                    self.stash
                        .lock()
                        .entry((msg_src, msg_tag))
                        .or_default()
                        .push_back(data);
                }
                Ok(Envelope::Abort(pe)) => {
                    *self.aborted.lock() = Some(pe);
                    return Err(CommError::PeerAborted(pe));
                }
                Err(RecvTimeoutError::Timeout) => {
                    RuntimeWarning::CollectiveTimeout("recv", start.elapsed().as_secs_f64(), src)
                        .print();
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CommError::Disconnected(src)),
            }
        }
    }
}

impl Drop for ChannelComm {
    fn drop(&mut self) {
        // wake every peer blocked on a message from this pe
        if std::thread::panicking() {
            for (pe, peer) in self.peers.iter().enumerate() {
                if pe != self.my_pe {
                    let _ = peer.send(Envelope::Abort(self.my_pe));
                }
            }
        }
    }
}
