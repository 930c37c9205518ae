//! Short-range radio: a per-body link port plus the transceiver that exchanges messages.

use tracing::trace;

use crate::BodyId;
use crate::config::RadioConfig;
use crate::error::{SensorResult, ensure_positive};
use crate::interaction::{LocalInteraction, Owner, Peer, StepContext};

/// A payload tagged with the body that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: BodyId,
    pub payload: Vec<u8>,
}

/// Radio state other bodies exchange with during a tick.
///
/// `was_communication` reports the last peer evaluated this tick: an in-range
/// exchange sets it on both sides and an out-of-range one clears it on both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationLink {
    enabled: bool,
    outgoing: Option<Vec<u8>>,
    received: Vec<Message>,
    was_communication: bool,
    sent: bool,
}

impl Default for CommunicationLink {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationLink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            outgoing: None,
            received: Vec::new(),
            was_communication: false,
            sent: false,
        }
    }

    /// Enable or mute transmission; a muted link still receives.
    pub fn set_transmit(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn transmit_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this link is broadcasting, regardless of anyone being in range.
    #[must_use]
    pub fn was_communication_sent(&self) -> bool {
        self.enabled
    }

    /// Whether the outgoing payload reached at least one peer this tick.
    #[must_use]
    pub fn payload_delivered(&self) -> bool {
        self.sent
    }

    /// Payload broadcast to every peer in range until replaced or cleared.
    pub fn set_message(&mut self, payload: Vec<u8>) {
        self.outgoing = Some(payload);
    }

    pub fn clear_message(&mut self) {
        self.outgoing = None;
    }

    #[must_use]
    pub fn message(&self) -> Option<&[u8]> {
        self.outgoing.as_deref()
    }

    /// Messages received this tick, in delivery order.
    #[must_use]
    pub fn received(&self) -> &[Message] {
        &self.received
    }

    pub fn take_received(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.received)
    }

    #[must_use]
    pub fn was_communication(&self) -> bool {
        self.was_communication
    }

    pub(crate) fn reset(&mut self) {
        self.received.clear();
        self.was_communication = false;
        self.sent = false;
    }

    pub(crate) fn outgoing(&self, sender: BodyId) -> Option<Message> {
        self.outgoing.as_ref().map(|payload| Message {
            sender,
            payload: payload.clone(),
        })
    }

    pub(crate) fn deliver(&mut self, message: Option<Message>) {
        self.was_communication = true;
        if let Some(message) = message {
            self.received.push(message);
        }
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }

    pub(crate) fn lose_contact(&mut self) {
        self.was_communication = false;
    }
}

/// Local interaction moving messages between the owner's and peers' links.
///
/// The effective range is jittered to `range × (0.9 + U(0, 0.1))` per exchange.
#[derive(Debug, Clone)]
pub struct RadioTransceiver {
    range: f64,
}

impl RadioTransceiver {
    pub fn new(config: &RadioConfig) -> SensorResult<Self> {
        config.validate()?;
        Ok(Self {
            range: config.range,
        })
    }

    #[must_use]
    pub fn range(&self) -> f64 {
        self.range
    }

    /// Call through `Body::with_local_mut` so the owner re-sorts its interactions.
    pub fn set_range(&mut self, range: f64) -> SensorResult<()> {
        ensure_positive(range, "radio range must be positive")?;
        self.range = range;
        Ok(())
    }
}

impl LocalInteraction for RadioTransceiver {
    fn range(&self) -> f64 {
        self.range
    }

    fn init(&mut self, owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        if let Some(link) = &mut owner.ports.radio {
            link.reset();
        }
    }

    fn object_step(
        &mut self,
        owner: &mut Owner<'_>,
        peer: &mut Peer<'_>,
        ctx: &mut StepContext<'_>,
    ) {
        let (Some(mine), Some(theirs)) = (&mut owner.ports.radio, &mut peer.ports.radio) else {
            return;
        };
        if !theirs.transmit_enabled() {
            return;
        }
        let threshold = self.range * ctx.rng.jitter_factor(0.9, 0.1);
        if peer.distance < threshold {
            let to_peer = mine.outgoing(owner.id);
            let to_owner = theirs.outgoing(peer.id);
            if to_peer.is_some() {
                mine.mark_sent();
            }
            if to_owner.is_some() {
                theirs.mark_sent();
            }
            theirs.deliver(to_peer);
            mine.deliver(to_owner);
            trace!(distance = peer.distance, threshold, "radio exchange");
        } else {
            mine.lose_contact();
            theirs.lose_contact();
        }
    }
}
