//! Bounded message port between the producer and the render context
//!
//! Two lock-free SPSC rings from the `ringbuf` crate:
//!
//! ```text
//! producer thread                         render callback
//!   MessageSender::send  ── forward ──▶   MessageReceiver::recv
//!   MessageSender::reclaim ◀── return ──  MessageReceiver::recycle
//! ```
//!
//! The return ring exists so the render side never frees sample vectors:
//! consumed messages travel back and the producer refills them in place.
//! Producers should get messages from [`MessageSender::take_message`], which
//! never lets more messages circulate than the return ring can hold.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use super::processor::AudioMessage;

/// Producer half (owned by the decode/capture thread)
pub struct MessageSender {
    forward: HeapProd<AudioMessage>,
    returned: HeapCons<AudioMessage>,
    /// Messages handed out by `take_message` so far
    allocated: usize,
    max_allocated: usize,
}

/// Consumer half (owned by the render callback)
pub struct MessageReceiver {
    forward: HeapCons<AudioMessage>,
    returned: HeapProd<AudioMessage>,
}

/// Create a port holding at most `capacity` in-flight messages
pub fn message_port(capacity: usize) -> (MessageSender, MessageReceiver) {
    let capacity = capacity.max(1);
    let (forward_prod, forward_cons) = HeapRb::<AudioMessage>::new(capacity).split();
    // Twice the budget so messages sent outside `take_message` still fit
    let (return_prod, return_cons) = HeapRb::<AudioMessage>::new(capacity * 2).split();

    (
        MessageSender {
            forward: forward_prod,
            returned: return_cons,
            allocated: 0,
            max_allocated: capacity,
        },
        MessageReceiver {
            forward: forward_cons,
            returned: return_prod,
        },
    )
}

impl MessageSender {
    /// Queue a message without blocking
    ///
    /// Returns the message back if the port is full.
    #[inline]
    pub fn send(&mut self, message: AudioMessage) -> Result<(), AudioMessage> {
        self.forward.try_push(message)
    }

    /// Take back a message the render side has finished with
    #[inline]
    pub fn reclaim(&mut self) -> Option<AudioMessage> {
        self.returned.try_pop()
    }

    /// A message to fill: a reclaimed one, or a new one while under budget
    ///
    /// Returns `None` once `capacity` messages are in circulation and none
    /// has come back yet; the caller should retry later.
    pub fn take_message(&mut self) -> Option<AudioMessage> {
        if let Some(message) = self.reclaim() {
            return Some(message);
        }
        if self.allocated < self.max_allocated {
            self.allocated += 1;
            return Some(AudioMessage::default());
        }
        None
    }

    /// Messages created by `take_message`
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Messages queued and not yet received
    pub fn pending(&self) -> usize {
        self.forward.occupied_len()
    }

    pub fn is_full(&self) -> bool {
        self.forward.is_full()
    }
}

impl MessageReceiver {
    /// Next queued message, if any
    #[inline]
    pub fn recv(&mut self) -> Option<AudioMessage> {
        self.forward.try_pop()
    }

    /// Hand a consumed message back to the producer for reuse
    ///
    /// Cannot overflow while producers stay within `take_message`'s budget;
    /// past that the message is dropped here.
    #[inline]
    pub fn recycle(&mut self, message: AudioMessage) {
        let _ = self.returned.try_push(message);
    }

    pub fn pending(&self) -> usize {
        self.forward.occupied_len()
    }
}
