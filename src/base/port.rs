/// `Port` models one end of a valid/ready streaming channel.
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::base::beat::Beat;

/// Component output: drives valid/payload, samples ready.
#[derive(Debug, Default)]
pub struct Master;

/// Component input: drives ready, samples valid/payload.
#[derive(Debug, Default)]
pub struct Slave;

/// Signals on one channel for the current cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Wire {
    pub beat: Option<Beat>,
    pub ready: bool,
}

impl Wire {
    pub fn valid(&self) -> bool {
        self.beat.is_some()
    }

    pub fn fired(&self) -> bool {
        self.ready && self.beat.is_some()
    }
}

/// Shared reference to a channel. Cloning gives another view of the same wires, which is how
/// passive monitors observe a link without driving it.
#[derive(Debug, Clone, Default)]
pub struct ChannelRef(Arc<RwLock<Wire>>);

impl ChannelRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Wire {
        self.0.read().expect("rw lock poisoned").clone()
    }

    pub fn valid(&self) -> bool {
        self.0.read().expect("rw lock poisoned").valid()
    }

    pub fn ready(&self) -> bool {
        self.0.read().expect("rw lock poisoned").ready
    }

    pub fn fired(&self) -> bool {
        self.0.read().expect("rw lock poisoned").fired()
    }

    pub fn peek(&self) -> Option<Beat> {
        self.0.read().expect("rw lock poisoned").beat.clone()
    }

    pub fn same_channel(&self, other: &ChannelRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns true if the driven value differs from what was on the wire.
    fn set_beat(&self, beat: Option<Beat>) -> bool {
        let mut wire = self.0.write().expect("rw lock poisoned");
        if wire.beat == beat {
            return false;
        }
        wire.beat = beat;
        true
    }

    fn set_ready(&self, ready: bool) -> bool {
        let mut wire = self.0.write().expect("rw lock poisoned");
        if wire.ready == ready {
            return false;
        }
        wire.ready = ready;
        true
    }
}

/// A port owns a private channel until it is linked. An unlinked slave never sees valid and an
/// unlinked master never sees ready.
#[derive(Debug, Default)]
pub struct Port<D> {
    chan: ChannelRef,
    direction: PhantomData<D>,
}

impl<D> Port<D> {
    pub fn new() -> Self {
        Port {
            chan: ChannelRef::new(),
            direction: PhantomData,
        }
    }

    pub fn channel(&self) -> ChannelRef {
        self.chan.clone()
    }

    pub fn wire(&self) -> Wire {
        self.chan.snapshot()
    }

    pub fn fired(&self) -> bool {
        self.chan.fired()
    }
}

impl Port<Master> {
    pub fn drive(&self, beat: Option<Beat>) -> bool {
        self.chan.set_beat(beat)
    }

    pub fn ready(&self) -> bool {
        self.chan.ready()
    }

    pub fn driven(&self) -> Option<Beat> {
        self.chan.peek()
    }
}

impl Port<Slave> {
    pub fn set_ready(&self, ready: bool) -> bool {
        self.chan.set_ready(ready)
    }

    pub fn valid(&self) -> bool {
        self.chan.valid()
    }

    pub fn peek(&self) -> Option<Beat> {
        self.chan.peek()
    }

    /// The beat transferred this cycle, if any.
    pub fn take_fired(&self) -> Option<Beat> {
        let wire = self.chan.snapshot();
        if wire.ready {
            wire.beat
        } else {
            None
        }
    }
}

pub fn ports<D>(n: usize) -> Vec<Port<D>> {
    (0..n).map(|_| Port::new()).collect()
}

/// Connects an output port to an input port by giving both the same channel.
pub fn link(m: &mut Port<Master>, s: &mut Port<Slave>) -> ChannelRef {
    let chan = ChannelRef::new();
    m.chan = chan.clone();
    s.chan = chan.clone();
    chan
}
