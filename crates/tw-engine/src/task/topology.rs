use std::sync::Arc;

use log::{info, warn};
use tw_thread::Task;

use super::{send, Reply};
use crate::audio::Audio;
use crate::channel::{Channel, Direction};
use crate::error::GraphResult;
use crate::link;

/// Change the channel layout of an audio. Unset dimensions stay as they are.
pub struct ResizeAudio {
    audio: Arc<Audio>,
    audio_channels: Option<u32>,
    output_pads: Option<u32>,
    input_pads: Option<u32>,
    reply: Reply<GraphResult<()>>,
}

impl ResizeAudio {
    pub fn new(audio: Arc<Audio>) -> Self {
        Self {
            audio,
            audio_channels: None,
            output_pads: None,
            input_pads: None,
            reply: None,
        }
    }

    pub fn audio_channels(mut self, n: u32) -> Self {
        self.audio_channels = Some(n);
        self
    }

    pub fn output_pads(mut self, n: u32) -> Self {
        self.output_pads = Some(n);
        self
    }

    pub fn input_pads(mut self, n: u32) -> Self {
        self.input_pads = Some(n);
        self
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<GraphResult<()>>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for ResizeAudio {
    fn name(&self) -> &str {
        "resize-audio"
    }

    fn launch(&mut self) {
        let audio = &self.audio;
        let audio_channels = self.audio_channels.unwrap_or_else(|| audio.audio_channels());
        let output_pads = self.output_pads.unwrap_or_else(|| audio.pads(Direction::Output));
        let input_pads = self.input_pads.unwrap_or_else(|| audio.pads(Direction::Input));
        let result = audio.resize(audio_channels, output_pads, input_pads);
        match &result {
            Ok(()) => info!(
                target: "task",
                "{}: {} audio channels, {} output pads, {} input pads",
                audio.name(),
                audio_channels,
                output_pads,
                input_pads
            ),
            Err(e) => warn!(target: "task", "resize {}: {e}", audio.name()),
        }
        send(&self.reply, result);
    }
}

/// Link an output to an input.
pub struct LinkChannel {
    a: Arc<Channel>,
    b: Arc<Channel>,
    reply: Reply<GraphResult<()>>,
}

impl LinkChannel {
    pub fn new(a: Arc<Channel>, b: Arc<Channel>) -> Self {
        Self { a, b, reply: None }
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<GraphResult<()>>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for LinkChannel {
    fn name(&self) -> &str {
        "link-channel"
    }

    fn launch(&mut self) {
        let result = link::link(&self.a, &self.b);
        if let Err(e) = &result {
            warn!(target: "task", "link {} -> {}: {e}", self.a.name(), self.b.name());
        }
        send(&self.reply, result);
    }
}

pub struct UnlinkChannel {
    channel: Arc<Channel>,
    reply: Reply<GraphResult<()>>,
}

impl UnlinkChannel {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self { channel, reply: None }
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<GraphResult<()>>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for UnlinkChannel {
    fn name(&self) -> &str {
        "unlink-channel"
    }

    fn launch(&mut self) {
        let result = link::unlink(&self.channel);
        if let Err(e) = &result {
            warn!(target: "task", "unlink {}: {e}", self.channel.name());
        }
        send(&self.reply, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flags;
    use crate::error::GraphError;
    use tw_ir::Presets;

    #[test]
    fn resize_keeps_unset_dimensions() {
        let audio = Audio::new("a", flags::OUTPUT_HAS_RECYCLING, &Presets::default());
        audio.resize(2, 3, 1).unwrap();
        ResizeAudio::new(audio.clone()).audio_channels(4).launch();
        assert_eq!(audio.channel_count(Direction::Output), 12);
        assert_eq!(audio.channel_count(Direction::Input), 4);

        ResizeAudio::new(audio.clone()).input_pads(0).launch();
        assert_eq!(audio.channel_count(Direction::Input), 0);
        assert_eq!(audio.pads(Direction::Output), 3);
    }

    #[test]
    fn rejected_resize_replies_and_keeps_layout() {
        let audio = Audio::new("a", flags::OUTPUT_HAS_RECYCLING, &Presets::default());
        audio.resize(2, 1, 1).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        ResizeAudio::new(audio.clone())
            .audio_channels(1 << 16)
            .output_pads(1 << 16)
            .with_reply(tx.clone())
            .launch();
        assert!(matches!(rx.recv().unwrap(), Err(GraphError::ChannelOutOfRange { .. })));
        assert_eq!(audio.audio_channels(), 2);
        assert_eq!(audio.channel_count(Direction::Output), 2);
        assert_eq!(audio.channel_count(Direction::Input), 2);

        ResizeAudio::new(audio.clone()).output_pads(2).with_reply(tx).launch();
        assert_eq!(rx.recv().unwrap(), Ok(()));
        assert_eq!(audio.channel_count(Direction::Output), 4);
    }

    #[test]
    fn link_reports_loops() {
        let a = Audio::new("a", 0, &Presets::default());
        let b = Audio::new("b", 0, &Presets::default());
        a.resize(1, 1, 1).unwrap();
        b.resize(1, 1, 1).unwrap();
        let a_out = a.channel(Direction::Output, 0).unwrap();
        let b_in = b.channel(Direction::Input, 0).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        LinkChannel::new(a_out.clone(), b_in.clone()).with_reply(tx.clone()).launch();
        assert_eq!(rx.recv().unwrap(), Ok(()));

        let b_out = b.channel(Direction::Output, 0).unwrap();
        let a_in = a.channel(Direction::Input, 0).unwrap();
        LinkChannel::new(b_out.clone(), a_in.clone()).with_reply(tx.clone()).launch();
        assert!(matches!(rx.recv().unwrap(), Err(GraphError::LoopInLink { .. })));
        assert!(!b_out.is_linked());

        UnlinkChannel::new(b_in.clone()).with_reply(tx.clone()).launch();
        assert_eq!(rx.recv().unwrap(), Ok(()));
        assert!(!a_out.is_linked());
        UnlinkChannel::new(b_in).with_reply(tx).launch();
        assert!(matches!(rx.recv().unwrap(), Err(GraphError::NotLinked(_))));
    }
}
