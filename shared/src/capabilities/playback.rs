use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::audio::PcmBuffer;

/// Fire-and-forget audio output through the device speaker.
#[derive(Clone)]
pub struct AudioPlayback<E> {
    context: CapabilityContext<PlaybackOperation, E>,
}

impl<Ev> Capability<Ev> for AudioPlayback<Ev> {
    type Operation = PlaybackOperation;
    type MappedSelf<MappedEv> = AudioPlayback<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        AudioPlayback::new(self.context.map_event(f))
    }
}

impl<E> AudioPlayback<E> {
    pub fn new(context: CapabilityContext<PlaybackOperation, E>) -> Self {
        Self { context }
    }
}

impl<E> AudioPlayback<E>
where
    E: Send + 'static,
{
    pub fn play(&self, buffer: PcmBuffer) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(PlaybackOperation::Play(buffer)).await;
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PlaybackOperation {
    Play(PcmBuffer),
}

impl Operation for PlaybackOperation {
    type Output = ();
}
