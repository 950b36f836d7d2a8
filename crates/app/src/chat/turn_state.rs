/// Identifier for one conversational turn.
///
/// A fresh id is allocated on every send so stale stream events can never be
/// attributed to a later turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    /// Creates a typed turn identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Turn lifecycle boundary for conversation orchestration.
///
/// This is the explicit at-most-one-turn-in-flight guard: `Start` is rejected
/// whenever another turn is streaming, regardless of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Streaming(TurnId),
    Done(TurnId),
    Error {
        id: TurnId,
        message: String,
    },
    Cancelled(TurnId),
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransition {
    Start(TurnId),
    Complete(TurnId),
    Fail { id: TurnId, message: String },
    Cancel(TurnId),
    ResetToIdle,
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransitionRejection {
    TurnInFlight { active: TurnId, attempted: TurnId },
    NoActiveTurn,
    TurnMismatch { active: TurnId, attempted: TurnId },
}

/// Result type for turn transition application.
pub type TurnTransitionResult = Result<TurnState, TurnTransitionRejection>;

impl TurnState {
    /// Returns the active turn id if and only if a turn is streaming.
    pub fn active_turn(&self) -> Option<TurnId> {
        match self {
            Self::Streaming(id) => Some(*id),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.active_turn().is_some()
    }

    /// Applies one transition deterministically.
    ///
    /// Non-streaming states may start a new turn directly. Any terminal
    /// transition (`Complete`/`Fail`/`Cancel`) must match the active turn id.
    pub fn apply(&self, transition: TurnTransition) -> TurnTransitionResult {
        match transition {
            TurnTransition::Start(id) => self.apply_start(id),
            TurnTransition::Complete(id) => self.apply_complete(id),
            TurnTransition::Fail { id, message } => self.apply_fail(id, message),
            TurnTransition::Cancel(id) => self.apply_cancel(id),
            TurnTransition::ResetToIdle => Ok(Self::Idle),
        }
    }

    fn apply_start(&self, id: TurnId) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) => Err(TurnTransitionRejection::TurnInFlight {
                active: *active,
                attempted: id,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Ok(Self::Streaming(id))
            }
        }
    }

    fn apply_complete(&self, id: TurnId) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) if *active == id => Ok(Self::Done(id)),
            Self::Streaming(active) => Err(TurnTransitionRejection::TurnMismatch {
                active: *active,
                attempted: id,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Err(TurnTransitionRejection::NoActiveTurn)
            }
        }
    }

    fn apply_fail(&self, id: TurnId, message: String) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) if *active == id => Ok(Self::Error { id, message }),
            Self::Streaming(active) => Err(TurnTransitionRejection::TurnMismatch {
                active: *active,
                attempted: id,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Err(TurnTransitionRejection::NoActiveTurn)
            }
        }
    }

    fn apply_cancel(&self, id: TurnId) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) if *active == id => Ok(Self::Cancelled(id)),
            Self::Streaming(active) => Err(TurnTransitionRejection::TurnMismatch {
                active: *active,
                attempted: id,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Err(TurnTransitionRejection::NoActiveTurn)
            }
        }
    }
}
