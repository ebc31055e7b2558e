use super::reactor::{Cmd, CmdSend};
use bytes::Bytes;
use certnet_api::*;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

/// Identifies one request handle across the caller/network thread
/// boundary. The network thread never holds a reference to the caller's
/// handle itself; addressing by id keeps cancellation valid even after
/// the handle's memory is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HandleId(pub(crate) u64);

enum SlotState {
    Pending,
    Complete(FetchResult<Bytes>),
    Taken,
}

/// The one piece of state shared between a caller thread and the
/// network thread: single producer, single consumer, and a single
/// Pending to Complete transition.
pub(crate) struct RequestSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
    reactor_thread: ThreadId,
}

impl std::fmt::Debug for RequestSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSlot")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl RequestSlot {
    pub fn new(reactor_thread: ThreadId) -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            cond: Condvar::new(),
            reactor_thread,
        }
    }

    /// Network thread side: store the result and wake the waiter.
    pub fn complete(&self, result: FetchResult<Bytes>) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Complete(result);
            self.cond.notify_all();
        }
    }

    /// Network thread side, on cancellation: record the abandonment
    /// without waking anyone. The caller is the one destroying the
    /// handle; no one is waiting.
    pub fn abandon(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Complete(Err(FetchError::aborted()));
        }
    }

    /// Whether no result has been delivered yet.
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock().unwrap(), SlotState::Pending)
    }

    /// Caller side: block until a result is delivered, and take it.
    pub fn wait_take(&self) -> FetchResult<Bytes> {
        debug_assert_ne!(
            self.reactor_thread,
            std::thread::current().id(),
            "wait_for_result on the network thread would deadlock",
        );

        let mut state = self.state.lock().unwrap();
        loop {
            match std::mem::replace(&mut *state, SlotState::Taken) {
                SlotState::Complete(result) => return result,
                SlotState::Pending => {
                    *state = SlotState::Pending;
                    state = self.cond.wait(state).unwrap();
                }
                SlotState::Taken => {
                    unreachable!("fetch result taken twice")
                }
            }
        }
    }
}

/// The caller-owned request handle produced by CoreCertNetFetcher.
pub(crate) struct CoreFetchRequest {
    key: FetchKey,
    handle_id: HandleId,
    slot: Arc<RequestSlot>,
    cmd_send: CmdSend,
    waited: bool,
}

impl std::fmt::Debug for CoreFetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreFetchRequest")
            .field("url", &self.key.url)
            .field("handle_id", &self.handle_id)
            .finish()
    }
}

impl CoreFetchRequest {
    pub fn new(
        key: FetchKey,
        handle_id: HandleId,
        slot: Arc<RequestSlot>,
        cmd_send: CmdSend,
    ) -> Self {
        Self {
            key,
            handle_id,
            slot,
            cmd_send,
            waited: false,
        }
    }
}

impl FetchRequest for CoreFetchRequest {
    fn wait_for_result(mut self: Box<Self>) -> FetchResult<Bytes> {
        self.waited = true;
        self.slot.wait_take()
    }
}

impl Drop for CoreFetchRequest {
    fn drop(&mut self) {
        if self.waited {
            return;
        }

        // Cancellation is cooperative: mark the intent here and let the
        // network thread act on it. If the result arrived in the
        // meantime, or arrives while this command is in flight, the
        // cancel resolves to a no-op over there.
        if self.slot.is_pending() {
            let _ = self.cmd_send.send(Cmd::CancelHandle {
                key: self.key.clone(),
                handle_id: self.handle_id,
            });
        }
    }
}
