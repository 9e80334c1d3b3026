use std::fmt;

/// Which side of the handshake this coordinator plays for the current call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Pressed "call" and sent the offer
    Caller,
    /// Connection created lazily from an inbound offer or candidate
    Callee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    AcquiringMedia,
    LocalStreamAcquired,
    OfferCreated,
    LocalDescriptionSet,
    AwaitingAnswer,
    RemoteDescriptionSet,
    AnswerCreated,
    CandidatesExchanging,
    Connected,
    Failed,
    Closed,
}

impl CallState {
    /// States in which no negotiation is in flight
    pub fn is_quiescent(self) -> bool {
        matches!(
            self,
            CallState::Idle
                | CallState::AcquiringMedia
                | CallState::LocalStreamAcquired
                | CallState::Closed
        )
    }

    /// States in which a locally created offer is outstanding
    pub fn is_offering(self) -> bool {
        matches!(
            self,
            CallState::OfferCreated | CallState::LocalDescriptionSet | CallState::AwaitingAnswer
        )
    }

    /// Transition table of the handshake
    pub fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;

        match (self, next) {
            (Idle | Closed, AcquiringMedia) => true,
            (AcquiringMedia, LocalStreamAcquired | Idle) => true,

            // caller
            (LocalStreamAcquired, OfferCreated) => true,
            (OfferCreated, LocalDescriptionSet) => true,
            (LocalDescriptionSet, AwaitingAnswer) => true,
            (AwaitingAnswer, RemoteDescriptionSet) => true,

            // callee; an offer may arrive whether or not media was started
            (s, RemoteDescriptionSet) if s.is_quiescent() => true,
            // renegotiation on the existing connection
            (
                AnswerCreated | CandidatesExchanging | Connected | Failed,
                RemoteDescriptionSet,
            ) => true,
            (RemoteDescriptionSet, AnswerCreated) => true,
            (AnswerCreated, LocalDescriptionSet) => true,
            (LocalDescriptionSet, CandidatesExchanging) => true,

            (
                LocalDescriptionSet
                | AwaitingAnswer
                | RemoteDescriptionSet
                | AnswerCreated
                | CandidatesExchanging,
                Connected,
            ) => true,

            (s, Failed) => !s.is_quiescent() && s != Failed,
            (s, Closed) => s != Closed,
            (Closed, Idle) => true,

            _ => false,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Enabled/disabled state of the three UI actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub start: bool,
    pub call: bool,
    pub hangup: bool,
}

impl Affordances {
    pub const INITIAL: Affordances = Affordances {
        start: true,
        call: false,
        hangup: false,
    };

    /// After hangup; start stays disabled until re-armed
    pub const HUNG_UP: Affordances = Affordances {
        start: false,
        call: false,
        hangup: false,
    };
}

impl Default for Affordances {
    fn default() -> Self {
        Self::INITIAL
    }
}
