use super::{HaloTransport, NetworkError, SubdomainId};
use crate::halo::{Direction, Inbox};
use crate::prelude::*;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// Command send between the subdomains and the delivery thread
enum Command {
    Deliver {
        direction: Direction,
        neighbor: SubdomainId,
        buffer: Vec<f64>,
        step: u64,
    },
    Shutdown,
}

/// In-process transport. Buffers are handed to a dedicated delivery thread, which deposits
/// them into the inbox of the receiving subdomain. The thread is stopped when the network is
/// dropped. Every send that returned `Ok` is delivered before the thread stops; sends issued
/// after the drop started fail with [`NetworkError::Disconnected`].
#[derive(Debug)]
pub struct LocalNetwork {
    handle: LocalHandle,
    thread_handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone)]
pub struct LocalHandle {
    num_subdomains: usize,
    queue: Sender<Command>,
    // Set once `Shutdown` is queued. Senders hold the read lock while enqueueing, so nothing
    // is queued behind `Shutdown`.
    closed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Deliver {
                direction,
                neighbor,
                buffer,
                step,
            } => write!(
                f,
                "Deliver({} of {} values to {} at step {})",
                direction,
                buffer.len(),
                neighbor,
                step
            ),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl LocalNetwork {
    /// Starts the delivery thread. `inboxes[i]` receives the buffers sent to subdomain `i`.
    pub fn new(inboxes: Vec<Arc<Inbox>>) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let num_subdomains = inboxes.len();

        let thread_handle = thread::Builder::new()
            .name("network".to_string())
            .spawn(move || run_delivery(inboxes, receiver))
            .context("failed to launch network thread")?;

        debug!("local network started for {} subdomains", num_subdomains);

        Ok(Self {
            handle: LocalHandle {
                num_subdomains,
                queue: sender,
                closed: Arc::new(RwLock::new(false)),
            },
            thread_handle: Some(thread_handle),
        })
    }

    pub fn handle(&self) -> LocalHandle {
        self.handle.clone()
    }
}

impl Drop for LocalNetwork {
    fn drop(&mut self) {
        {
            let mut closed = self.handle.closed.write();
            *closed = true;
            let _ = self.handle.queue.send(Command::Shutdown);
        }

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("network thread panicked");
            }
        }
    }
}

impl HaloTransport for LocalHandle {
    fn send(
        &self,
        direction: Direction,
        neighbor: SubdomainId,
        buffer: Vec<f64>,
        step: u64,
    ) -> Result<(), NetworkError> {
        if neighbor.get() >= self.num_subdomains {
            return Err(NetworkError::InvalidSubdomain(neighbor));
        }

        let closed = self.closed.read();
        if *closed {
            return Err(NetworkError::Disconnected);
        }

        self.queue
            .send(Command::Deliver {
                direction,
                neighbor,
                buffer,
                step,
            })
            .map_err(|_| NetworkError::Disconnected)
    }
}

fn run_delivery(inboxes: Vec<Arc<Inbox>>, queue: Receiver<Command>) {
    let mut delivered = 0u64;

    for command in queue {
        trace!("network: {:?}", command);

        match command {
            Command::Deliver {
                direction,
                neighbor,
                buffer,
                step,
            } => {
                inboxes[neighbor.get()]
                    .channel(direction.opposite())
                    .deposit(step, buffer);
                delivered += 1;
            }
            Command::Shutdown => break,
        }
    }

    debug!("network thread delivered {} buffers", delivered);
}
