//! The two narrow collaborator contracts the registry drives each tick,
//! plus an in-memory fixture for tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Hands a frame to the bus. Must not block indefinitely; returning `false`
/// and panicking-free failure are treated identically by the registry.
pub trait Transmitter {
    fn send(&self, can_id: u16, payload: &[u8]) -> bool;
}

/// Pulls one frame off the bus, if one is ready.
pub trait Receiver {
    fn receive(&self) -> Option<(u16, Vec<u8>)>;
}

type Queue = Rc<RefCell<VecDeque<(u16, Vec<u8>)>>>;

/// An in-memory transceiver for tests. A frame handed to `send` becomes
/// available from `receive` — either on the same instance (loopback, for
/// single-registry tests) or on a paired instance (for cross-registry
/// round-trip tests), depending on which constructor built it.
#[derive(Debug, Clone)]
pub struct DummyTransceiver {
    outbox: Queue,
    inbox: Queue,
}

impl DummyTransceiver {
    /// Sent frames loop back to this same transceiver's `receive`.
    pub fn new() -> Self {
        let queue = Rc::new(RefCell::new(VecDeque::new()));
        DummyTransceiver {
            outbox: queue.clone(),
            inbox: queue,
        }
    }

    /// Two transceivers cross-wired: frames sent on one arrive on the
    /// other's `receive`, as if joined by a shared bus.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
        let b_to_a = Rc::new(RefCell::new(VecDeque::new()));
        (
            DummyTransceiver {
                outbox: a_to_b.clone(),
                inbox: b_to_a.clone(),
            },
            DummyTransceiver {
                outbox: b_to_a,
                inbox: a_to_b,
            },
        )
    }
}

impl Default for DummyTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmitter for DummyTransceiver {
    fn send(&self, can_id: u16, payload: &[u8]) -> bool {
        log::debug!("MSG ID {:03x} - {:?}", can_id, payload);
        self.outbox.borrow_mut().push_back((can_id, payload.to_vec()));
        true
    }
}

impl Receiver for DummyTransceiver {
    fn receive(&self) -> Option<(u16, Vec<u8>)> {
        self.inbox.borrow_mut().pop_front()
    }
}
