//! Native agent harness: spawns OS threads that share one runtime handle.
//!
//! The arena core only assumes that "a new agent sees the same bytes at the
//! same offsets"; this crate supplies that for native builds by cloning an
//! `Arc<Runtime>` into plain OS threads. Each spawned agent bootstraps as a
//! participant before running its body, so agent ids and root discovery
//! work exactly as they would across processes. Status messages go through
//! the `log` facade and are best effort.

use arena::{AgentId, ArenaResult, Role, Runtime};
use log::debug;
use std::sync::Arc;
use std::thread;

/// Builds a runtime of `words` words and bootstraps the caller as the
/// coordinator (agent 0).
pub fn coordinator(words: usize) -> ArenaResult<Arc<Runtime>> {
    let runtime = Arc::new(Runtime::with_capacity(words)?);
    let id = runtime.arena().bootstrap(Role::Coordinator)?;
    debug!("coordinator online as agent {}", id.0);
    Ok(runtime)
}

/// A group of spawned participant agents.
///
/// Dropping the group without [`AgentGroup::join`] detaches the agents;
/// tests always join.
pub struct AgentGroup {
    handles: Vec<thread::JoinHandle<()>>,
}

impl AgentGroup {
    /// Spawns `count` participant agents, each bootstrapping against the
    /// shared arena and then running `body` with its assigned id.
    pub fn spawn<F>(runtime: &Arc<Runtime>, count: usize, body: F) -> Self
    where
        F: Fn(&Runtime, AgentId) + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        let handles = (0..count)
            .map(|n| {
                let runtime = Arc::clone(runtime);
                let body = Arc::clone(&body);
                thread::Builder::new()
                    .name(format!("agent-{n}"))
                    .spawn(move || {
                        let id = runtime
                            .arena()
                            .bootstrap(Role::Participant)
                            .expect("participant bootstrap");
                        debug!("agent {} online", id.0);
                        body(&runtime, id);
                        debug!("agent {} done", id.0);
                    })
                    .expect("spawn agent thread")
            })
            .collect();
        Self { handles }
    }

    /// Number of agents in the group.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true when the group holds no agents.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every agent to finish, propagating the first panic.
    pub fn join(self) {
        for handle in self.handles {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
    }
}
