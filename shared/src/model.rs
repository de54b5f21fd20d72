use crate::config::GatewayConfig;
use crate::conversation::Conversation;
use crate::presenter::GuideSelection;

#[derive(Debug, Default)]
pub struct Model {
    pub selection: GuideSelection,
    pub conversation: Conversation,
    /// Absent until the shell delivers a valid configuration.
    pub config: Option<GatewayConfig>,
    /// Outstanding read-aloud requests; playback overlaps.
    pub pending_speech: usize,
}

impl Model {
    /// Busy while a chat turn or any speech request is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.conversation.is_sending() || self.pending_speech > 0
    }
}
