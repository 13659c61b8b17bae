use crate::comm::{Backend, Comm};
use crate::config;
use crate::error::CommResult;
use crate::process_group::ProcessGroup;
use crate::warnings::RuntimeWarning;

use std::sync::Arc;

/// One PE's handle on a group of cooperating PEs.
///
/// Constructing a DistWorld is necessary to create distributed arrays or to issue collectives.
#[derive(Debug, Clone)]
pub struct DistWorld {
    group: Arc<ProcessGroup>,
}

impl DistWorld {
    /// The group every array created from this world is distributed over
    pub fn group(&self) -> &Arc<ProcessGroup> {
        &self.group
    }

    /// Returns the id of this PE (roughly equivalent to MPI Rank)
    pub fn my_pe(&self) -> usize {
        self.group.my_pe()
    }

    /// Returns number of PE's in this execution
    pub fn num_pes(&self) -> usize {
        self.group.num_pes()
    }

    pub fn backend(&self) -> Backend {
        self.group.backend()
    }

    /// Global synchronization method which blocks calling thread until all PEs in the world have entered the barrier
    #[tracing::instrument(skip_all)]
    pub fn barrier(&self) -> CommResult<()> {
        self.group.barrier()
    }
}

/// An implementation of the Builder design pattern, used to construct DistWorlds.
///
/// Defaults are taken from the `DISTARRAY_*` environment variables, see [crate::env_var::Config].
#[derive(Debug, Clone)]
pub struct DistWorldBuilder {
    backend: Backend,
    num_pes: usize,
}

impl Default for DistWorldBuilder {
    fn default() -> Self {
        DistWorldBuilder::new()
    }
}

impl DistWorldBuilder {
    /// Construct a new world builder
    pub fn new() -> DistWorldBuilder {
        DistWorldBuilder {
            backend: Backend::default(),
            num_pes: config().num_pes,
        }
    }

    /// Specify the communication backend, with `Backend::Local` only a single PE is supported
    pub fn with_backend(mut self, backend: Backend) -> DistWorldBuilder {
        self.backend = backend;
        self
    }

    pub fn with_num_pes(mut self, num_pes: usize) -> DistWorldBuilder {
        self.num_pes = num_pes.max(1);
        self
    }

    /// Toggle the potential deadlock warnings for the whole process
    pub fn with_runtime_warnings(self, enabled: bool) -> DistWorldBuilder {
        if enabled {
            RuntimeWarning::enable_warnings();
        } else {
            RuntimeWarning::disable_warnings();
        }
        self
    }

    /// Create one world per PE of a new group, index `i` is PE `i`.
    ///
    /// Each world must be driven by its own thread, collectives block until every PE takes part.
    #[tracing::instrument(skip_all)]
    pub fn build_group(self) -> Vec<DistWorld> {
        let backend = if self.num_pes > 1 {
            Backend::Channel
        } else {
            self.backend
        };
        tracing::debug!(?backend, num_pes = self.num_pes, "building group");
        Comm::create_group(backend, self.num_pes)
            .into_iter()
            .map(|comm| DistWorld {
                group: Arc::new(ProcessGroup::new(comm)),
            })
            .collect()
    }

    /// Run `f` once per PE, each on its own thread, and return the results in rank order.
    ///
    /// If any PE panics, the panic is resumed on the calling thread after every PE has finished.
    pub fn launch<F, R>(self, f: F) -> Vec<R>
    where
        F: Fn(DistWorld) -> R + Sync,
        R: Send,
    {
        let worlds = self.build_group();
        let f = &f;
        let joined = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = worlds
                .into_iter()
                .map(|world| {
                    let pe = world.my_pe();
                    s.builder()
                        .name(format!("distarray-pe-{}", pe))
                        .spawn(move |_| f(world))
                        .unwrap_or_else(|e| panic!("failed to spawn pe {}: {}", pe, e))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        });
        let joined = match joined {
            Ok(joined) => joined,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        let mut results = Vec::with_capacity(joined.len());
        let mut first_panic = None;
        for result in joined {
            match result {
                Ok(r) => results.push(r),
                Err(panic) => {
                    first_panic.get_or_insert(panic);
                }
            }
        }
        if let Some(panic) = first_panic {
            std::panic::resume_unwind(panic);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_returns_results_in_rank_order() {
        let results = DistWorldBuilder::new()
            .with_backend(Backend::Channel)
            .with_num_pes(4)
            .launch(|world| {
                world.barrier().unwrap();
                (world.my_pe(), world.num_pes())
            });
        assert_eq!(results, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn single_pe_uses_the_requested_backend() {
        let worlds = DistWorldBuilder::new()
            .with_backend(Backend::Local)
            .with_num_pes(1)
            .build_group();
        assert_eq!(worlds.len(), 1);
        assert_eq!(worlds[0].backend(), Backend::Local);
        assert!(worlds[0].barrier().is_ok());
    }

    #[test]
    #[should_panic]
    fn panics_propagate_to_the_caller() {
        DistWorldBuilder::new().with_num_pes(2).launch(|world| {
            if world.my_pe() == 1 {
                panic!("pe 1 failed");
            }
            world.barrier().unwrap();
        });
    }
}
