pub(crate) mod channel_comm;
pub(crate) mod local_comm;

use crate::config;
use crate::error::CommResult;
use channel_comm::ChannelComm;
use local_comm::LocalComm;

use enum_dispatch::enum_dispatch;

/// The list of available communication backends, used to specify how data is transfered between PEs
#[derive(
    serde::Serialize, serde::Deserialize, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Clone, Copy,
)]
pub enum Backend {
    /// The Local backend -- a single PE, collectives are no-ops on the local buffer
    Local,
    /// The Channel backend -- every PE runs on its own thread, all data is serialized and moved through channels
    Channel,
}

impl Default for Backend {
    fn default() -> Self {
        match config().backend.as_str() {
            "channel" => Backend::Channel,
            _ => Backend::Local,
        }
    }
}

/// Point to point messaging shared by all backends, collectives are built on top of this.
///
/// Messages are matched on `(src, tag)`, a message that arrives before it is asked for
/// is held until a matching `recv` is issued.
#[enum_dispatch]
pub(crate) trait CommOps {
    fn my_pe(&self) -> usize;
    fn num_pes(&self) -> usize;
    fn send(&self, dst: usize, tag: usize, data: Vec<u8>) -> CommResult<()>;
    fn recv(&self, src: usize, tag: usize) -> CommResult<Vec<u8>>;
}

#[enum_dispatch(CommOps)]
#[derive(Debug)]
pub(crate) enum Comm {
    Local(LocalComm),
    Channel(ChannelComm),
}

impl Comm {
    pub(crate) fn backend(&self) -> Backend {
        match self {
            Comm::Local(_) => Backend::Local,
            Comm::Channel(_) => Backend::Channel,
        }
    }

    /// create the communicators for every pe of a new group, index i belongs to pe i
    pub(crate) fn create_group(backend: Backend, num_pes: usize) -> Vec<Comm> {
        match backend {
            Backend::Local if num_pes <= 1 => vec![LocalComm::new().into()],
            _ => ChannelComm::create_group(num_pes.max(1))
                .into_iter()
                .map(Comm::from)
                .collect(),
        }
    }
}
