use teloxide::types::MessageId;

/// What an admin is broadcasting to active VIPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddVipStep {
    AwaitingTarget,
    AwaitingDays { target: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyStep {
    ChoosingKind,
    AwaitingPayload(PayloadKind),
}

/// The single multi-step flow a chat is in. Entering a flow replaces
/// whatever was there before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conversation {
    #[default]
    Idle,
    AwaitingPairingNumber { prompt: Option<MessageId> },
    AwaitingSupportText { prompt: Option<MessageId> },
    AdminAddVip(AddVipStep),
    AdminNotify(NotifyStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BeginPairing,
    BeginSupport,
    /// Records the instruction message of an awaiting flow so it can be
    /// cleaned up later.
    AttachPrompt(MessageId),
    BeginAddVip,
    VipTargetChosen(i64),
    BeginNotify,
    NotifyKindChosen(PayloadKind),
    Reset,
}

impl Conversation {
    pub fn apply(self, transition: Transition) -> Conversation {
        use Conversation::*;

        match (self, transition) {
            (_, Transition::Reset) => Idle,
            (_, Transition::BeginPairing) => AwaitingPairingNumber { prompt: None },
            (_, Transition::BeginSupport) => AwaitingSupportText { prompt: None },
            (AwaitingPairingNumber { .. }, Transition::AttachPrompt(id)) => {
                AwaitingPairingNumber { prompt: Some(id) }
            }
            (AwaitingSupportText { .. }, Transition::AttachPrompt(id)) => {
                AwaitingSupportText { prompt: Some(id) }
            }
            (state, Transition::AttachPrompt(_)) => state,
            (_, Transition::BeginAddVip) => AdminAddVip(AddVipStep::AwaitingTarget),
            (AdminAddVip(AddVipStep::AwaitingTarget), Transition::VipTargetChosen(target)) => {
                AdminAddVip(AddVipStep::AwaitingDays { target })
            }
            (state, Transition::VipTargetChosen(_)) => state,
            (_, Transition::BeginNotify) => AdminNotify(NotifyStep::ChoosingKind),
            (_, Transition::NotifyKindChosen(kind)) => {
                AdminNotify(NotifyStep::AwaitingPayload(kind))
            }
        }
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        matches!(self, Conversation::Idle)
    }
}
