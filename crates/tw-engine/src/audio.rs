//! Audios: sound producing units owning output and input channels.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use log::debug;
use tw_audio::{SharedSequencer, SharedSoundcard};
use tw_ir::{Presets, DEFAULT_BPM};

use crate::channel::{Channel, Direction};
use crate::error::{GraphError, GraphResult};
use crate::object::{next_id, ObjectMutex};
use crate::playback::PlaybackDomain;
use crate::recall::{Recall, RecallContainer, RecallList};
use crate::recall_id::RecallId;

/// Audio flags.
pub mod flags {
    /// Output channels own a recycling.
    pub const OUTPUT_HAS_RECYCLING: u32 = 1 << 0;
    /// Input channels own a recycling.
    pub const INPUT_HAS_RECYCLING: u32 = 1 << 1;
    /// Output line `n` maps to input line `n`.
    pub const SYNC: u32 = 1 << 2;
    /// Every output maps to all inputs of the same audio channel.
    pub const ASYNC: u32 = 1 << 3;
    pub const CONNECTED: u32 = 1 << 4;
}

struct AudioState {
    audio_channels: u32,
    output_pads: u32,
    input_pads: u32,
    outputs: Vec<Arc<Channel>>,
    inputs: Vec<Arc<Channel>>,
    /// Channels removed by a shrink that still hold voice signals.
    retired: Vec<Arc<Channel>>,
    presets: Presets,
    bpm: f64,
    play: Vec<Arc<Recall>>,
    recall: Vec<Arc<Recall>>,
    containers: Vec<Arc<RecallContainer>>,
    recall_ids: Vec<Arc<RecallId>>,
    soundcard: Option<SharedSoundcard>,
    sequencer: Option<SharedSequencer>,
}

/// A sound producing unit.
///
/// Owns `audio_channels * pads` channels per direction. The channel vectors
/// are only changed by [`resize`](Audio::resize), which keeps existing
/// channels at their pad and audio channel.
pub struct Audio {
    id: u64,
    name: String,
    flags: AtomicU32,
    domain: Arc<PlaybackDomain>,
    weak_self: Weak<Audio>,
    state: ObjectMutex<AudioState>,
}

impl Audio {
    /// An audio without channels. Call [`resize`](Self::resize) to add them.
    pub fn new(name: &str, flags: u32, presets: &Presets) -> Arc<Self> {
        let id = next_id();
        Arc::new_cyclic(|weak| Self {
            id,
            name: name.to_string(),
            flags: AtomicU32::new(flags),
            domain: Arc::new(PlaybackDomain::new(id)),
            weak_self: weak.clone(),
            state: ObjectMutex::new(AudioState {
                audio_channels: 0,
                output_pads: 0,
                input_pads: 0,
                outputs: Vec::new(),
                inputs: Vec::new(),
                retired: Vec::new(),
                presets: *presets,
                bpm: DEFAULT_BPM,
                play: Vec::new(),
                recall: Vec::new(),
                containers: Vec::new(),
                recall_ids: Vec::new(),
                soundcard: None,
                sequencer: None,
            }),
        })
    }

    // --- Identity and flags ---

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Relaxed)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags() & flag != 0
    }

    pub fn set_flags(&self, flags: u32) {
        self.flags.fetch_or(flags, Ordering::Relaxed);
    }

    pub fn unset_flags(&self, flags: u32) {
        self.flags.fetch_and(!flags, Ordering::Relaxed);
    }

    pub fn domain(&self) -> &Arc<PlaybackDomain> {
        &self.domain
    }

    // --- Topology ---

    pub fn audio_channels(&self) -> u32 {
        self.state.with(|s| s.audio_channels)
    }

    pub fn pads(&self, direction: Direction) -> u32 {
        self.state.with(|s| match direction {
            Direction::Output => s.output_pads,
            Direction::Input => s.input_pads,
        })
    }

    pub fn channel_count(&self, direction: Direction) -> usize {
        self.state.with(|s| match direction {
            Direction::Output => s.outputs.len(),
            Direction::Input => s.inputs.len(),
        })
    }

    pub fn channels(&self, direction: Direction) -> Vec<Arc<Channel>> {
        self.state.with(|s| match direction {
            Direction::Output => s.outputs.clone(),
            Direction::Input => s.inputs.clone(),
        })
    }

    pub fn outputs(&self) -> Vec<Arc<Channel>> {
        self.channels(Direction::Output)
    }

    pub fn inputs(&self) -> Vec<Arc<Channel>> {
        self.channels(Direction::Input)
    }

    /// Channel at `line`, or `ChannelOutOfRange`.
    pub fn channel(&self, direction: Direction, line: u32) -> GraphResult<Arc<Channel>> {
        self.state.with(|s| {
            let list = match direction {
                Direction::Output => &s.outputs,
                Direction::Input => &s.inputs,
            };
            list.get(line as usize)
                .cloned()
                .ok_or(GraphError::ChannelOutOfRange {
                    what: "line",
                    index: line,
                    available: list.len() as u32,
                })
        })
    }

    pub fn channel_at(&self, direction: Direction, pad: u32, audio_channel: u32) -> Option<Arc<Channel>> {
        self.state.with(|s| {
            if audio_channel >= s.audio_channels {
                return None;
            }
            let list = match direction {
                Direction::Output => &s.outputs,
                Direction::Input => &s.inputs,
            };
            list.get((pad * s.audio_channels + audio_channel) as usize).cloned()
        })
    }

    /// Inputs feeding `output`.
    pub fn mapped_inputs(&self, output: &Channel) -> Vec<Arc<Channel>> {
        let inputs = self.inputs();
        if self.has_flag(flags::ASYNC) {
            let ac = output.audio_channel();
            inputs.into_iter().filter(|i| i.audio_channel() == ac).collect()
        } else {
            inputs.into_iter().filter(|i| i.line() == output.line()).collect()
        }
    }

    /// Outputs fed by `input`.
    pub fn mapped_outputs(&self, input: &Channel) -> Vec<Arc<Channel>> {
        let outputs = self.outputs();
        if self.has_flag(flags::ASYNC) {
            let ac = input.audio_channel();
            outputs.into_iter().filter(|o| o.audio_channel() == ac).collect()
        } else {
            outputs.into_iter().filter(|o| o.line() == input.line()).collect()
        }
    }

    // --- Resize ---

    pub fn set_audio_channels(&self, audio_channels: u32) -> GraphResult<()> {
        let (outputs, inputs) = self.state.with(|s| (s.output_pads, s.input_pads));
        self.resize(audio_channels, outputs, inputs)
    }

    pub fn set_pads(&self, direction: Direction, pads: u32) -> GraphResult<()> {
        let (ac, outputs, inputs) = self.state.with(|s| (s.audio_channels, s.output_pads, s.input_pads));
        match direction {
            Direction::Output => self.resize(ac, pads, inputs),
            Direction::Input => self.resize(ac, outputs, pads),
        }
    }

    /// Rebuild both channel vectors for the new counts.
    ///
    /// Channels keeping their (pad, audio channel) are reused. New channels
    /// start unlinked with a silent template. Dropped channels are unlinked
    /// and retired until their recyclings hold no voice signal.
    ///
    /// Fails with [`GraphError::ChannelOutOfRange`] and changes nothing when
    /// either side would exceed [`MAX_LINES`] channels.
    pub fn resize(&self, audio_channels: u32, output_pads: u32, input_pads: u32) -> GraphResult<()> {
        check_lines(audio_channels, output_pads)?;
        check_lines(audio_channels, input_pads)?;
        let presets = self.presets();
        let output_recycling = self.has_flag(flags::OUTPUT_HAS_RECYCLING);
        let input_recycling = self.has_flag(flags::INPUT_HAS_RECYCLING);

        let (old_ac, old_outputs, old_output_pads, old_inputs, old_input_pads) = self.state.with(|s| {
            (
                s.audio_channels,
                s.outputs.clone(),
                s.output_pads,
                s.inputs.clone(),
                s.input_pads,
            )
        });

        let (outputs, dropped_outputs) = self.rebuild(
            Direction::Output,
            &old_outputs,
            old_ac,
            old_output_pads,
            audio_channels,
            output_pads,
            &presets,
            output_recycling,
        );
        let (inputs, dropped_inputs) = self.rebuild(
            Direction::Input,
            &old_inputs,
            old_ac,
            old_input_pads,
            audio_channels,
            input_pads,
            &presets,
            input_recycling,
        );

        let retired: Vec<Arc<Channel>> = dropped_outputs.into_iter().chain(dropped_inputs).collect();
        for channel in &retired {
            unlink_both(channel);
        }

        self.domain
            .set_playbacks(outputs.iter().map(|c| c.playback().clone()).collect());

        self.state.with_mut(|s| {
            s.audio_channels = audio_channels;
            s.output_pads = output_pads;
            s.input_pads = input_pads;
            s.outputs = outputs;
            s.inputs = inputs;
            s.retired.extend(retired);
        });
        debug!(target: "graph", "resized {} to {}x{}/{}", self.name, audio_channels, output_pads, input_pads);

        self.reap_retired();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn rebuild(
        &self,
        direction: Direction,
        old: &[Arc<Channel>],
        old_ac: u32,
        old_pads: u32,
        audio_channels: u32,
        pads: u32,
        presets: &Presets,
        has_recycling: bool,
    ) -> (Vec<Arc<Channel>>, Vec<Arc<Channel>>) {
        let mut channels = Vec::with_capacity((audio_channels * pads) as usize);
        for pad in 0..pads {
            for ac in 0..audio_channels {
                let line = pad * audio_channels + ac;
                let reused = (pad < old_pads && ac < old_ac)
                    .then(|| old.get((pad * old_ac + ac) as usize).cloned())
                    .flatten();
                let channel = match reused {
                    Some(channel) => {
                        channel.set_position(pad, ac, line);
                        channel
                    }
                    None => Channel::new(
                        self.weak_self.clone(),
                        direction,
                        pad,
                        ac,
                        line,
                        presets,
                        has_recycling,
                    ),
                };
                channels.push(channel);
            }
        }
        let dropped = old
            .iter()
            .filter(|c| !channels.iter().any(|n| n.id() == c.id()))
            .cloned()
            .collect();
        (channels, dropped)
    }

    /// Release retired channels whose recyclings hold no voice signal.
    /// Returns how many are still waiting.
    pub fn reap_retired(&self) -> usize {
        self.state.with_mut(|s| {
            s.retired.retain(|c| c.has_live_signals());
            s.retired.len()
        })
    }

    pub fn retired_count(&self) -> usize {
        self.state.with(|s| s.retired.len())
    }

    // --- Presets and tempo ---

    pub fn presets(&self) -> Presets {
        self.state.with(|s| s.presets)
    }

    /// Apply presets to the audio and every channel, recycling and signal.
    pub fn apply_presets(&self, presets: &Presets) {
        let channels = self.state.with_mut(|s| {
            s.presets = *presets;
            s.outputs
                .iter()
                .chain(s.inputs.iter())
                .chain(s.retired.iter())
                .cloned()
                .collect::<Vec<_>>()
        });
        for channel in channels {
            channel.apply_presets(presets);
        }
    }

    pub fn bpm(&self) -> f64 {
        self.state.with(|s| s.bpm)
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.state.with_mut(|s| s.bpm = bpm);
    }

    // --- Devices ---

    pub fn soundcard(&self) -> Option<SharedSoundcard> {
        self.state.with(|s| s.soundcard.clone())
    }

    pub fn set_soundcard(&self, soundcard: Option<SharedSoundcard>) {
        self.state.with_mut(|s| s.soundcard = soundcard);
    }

    pub fn sequencer(&self) -> Option<SharedSequencer> {
        self.state.with(|s| s.sequencer.clone())
    }

    pub fn set_sequencer(&self, sequencer: Option<SharedSequencer>) {
        self.state.with_mut(|s| s.sequencer = sequencer);
    }

    // --- Recalls ---

    /// Audio level recalls of `list`.
    pub fn recalls(&self, list: RecallList) -> Vec<Arc<Recall>> {
        self.state.with(|s| match list {
            RecallList::Play => s.play.clone(),
            RecallList::Recall => s.recall.clone(),
        })
    }

    pub(crate) fn add_recall(&self, list: RecallList, recall: Arc<Recall>) {
        self.state.with_mut(|s| match list {
            RecallList::Play => s.play.push(recall),
            RecallList::Recall => s.recall.push(recall),
        });
    }

    pub(crate) fn remove_recall(&self, id: u64) {
        self.state.with_mut(|s| {
            s.play.retain(|r| r.id() != id);
            s.recall.retain(|r| r.id() != id);
        });
    }

    pub fn containers(&self) -> Vec<Arc<RecallContainer>> {
        self.state.with(|s| s.containers.clone())
    }

    pub(crate) fn add_container(&self, container: Arc<RecallContainer>) {
        self.state.with_mut(|s| s.containers.push(container));
    }

    /// Container of `effect` registered for `list`.
    pub fn find_container(&self, effect: &str, list: RecallList) -> Option<Arc<RecallContainer>> {
        self.state.with(|s| {
            s.containers
                .iter()
                .find(|c| c.effect() == effect && c.list() == list)
                .cloned()
        })
    }

    /// Every template and instance in every container.
    pub fn all_recalls(&self) -> Vec<Arc<Recall>> {
        self.containers()
            .iter()
            .flat_map(|c| c.templates().into_iter().chain(c.instances()))
            .collect()
    }

    // --- Voices ---

    pub fn recall_ids(&self) -> Vec<Arc<RecallId>> {
        self.state.with(|s| s.recall_ids.clone())
    }

    pub(crate) fn add_recall_id(&self, recall_id: Arc<RecallId>) {
        self.state.with_mut(|s| {
            if !s.recall_ids.iter().any(|r| r.id() == recall_id.id()) {
                s.recall_ids.push(recall_id);
            }
        });
    }

    pub(crate) fn remove_recall_id(&self, id: u64) {
        self.state.with_mut(|s| s.recall_ids.retain(|r| r.id() != id));
    }
}

impl std::fmt::Debug for Audio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audio")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags())
            .field("audio_channels", &self.audio_channels())
            .finish()
    }
}

/// Most channels an audio may own per direction.
pub const MAX_LINES: u32 = 1 << 16;

fn check_lines(audio_channels: u32, pads: u32) -> GraphResult<()> {
    match audio_channels.checked_mul(pads) {
        Some(lines) if lines <= MAX_LINES => Ok(()),
        lines => Err(GraphError::ChannelOutOfRange {
            what: "line count",
            index: lines.unwrap_or(u32::MAX),
            available: MAX_LINES,
        }),
    }
}

/// Clear the link of `channel` and of its partner.
pub(crate) fn unlink_both(channel: &Channel) {
    if let Some(partner) = channel.link() {
        partner.set_link_raw(Weak::new());
    }
    channel.set_link_raw(Weak::new());
}
