//! Channels: one audio line of an audio.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tw_ir::Presets;

use crate::audio::Audio;
use crate::object::{next_id, ObjectMutex};
use crate::playback::Playback;
use crate::recall::{Recall, RecallList};
use crate::recall_id::RecallId;
use crate::recycling::Recycling;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Output,
    Input,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Output => Direction::Input,
            Direction::Input => Direction::Output,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Direction::Output => "out",
            Direction::Input => "in",
        }
    }
}

struct ChannelState {
    link: Weak<Channel>,
    recycling: Option<Arc<Recycling>>,
    presets: Presets,
    play: Vec<Arc<Recall>>,
    recall: Vec<Arc<Recall>>,
    recall_ids: Vec<Arc<RecallId>>,
    connected: bool,
}

/// One line of an audio, addressed by pad and audio channel.
///
/// Orderings are not stored: next/prev and next-pad/prev-pad are derived
/// from the owning audio's channel vector, where
/// `line = pad * audio_channels + audio_channel`.
pub struct Channel {
    id: u64,
    audio: Weak<Audio>,
    direction: Direction,
    pad: AtomicU32,
    audio_channel: AtomicU32,
    line: AtomicU32,
    playback: Arc<Playback>,
    state: ObjectMutex<ChannelState>,
}

impl Channel {
    pub(crate) fn new(
        audio: Weak<Audio>,
        direction: Direction,
        pad: u32,
        audio_channel: u32,
        line: u32,
        presets: &Presets,
        has_recycling: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            id: next_id(),
            audio,
            direction,
            pad: AtomicU32::new(pad),
            audio_channel: AtomicU32::new(audio_channel),
            line: AtomicU32::new(line),
            playback: Arc::new(Playback::new(weak.clone())),
            state: ObjectMutex::new(ChannelState {
                link: Weak::new(),
                recycling: has_recycling.then(|| Recycling::new(presets)),
                presets: *presets,
                play: Vec::new(),
                recall: Vec::new(),
                recall_ids: Vec::new(),
                connected: false,
            }),
        })
    }

    // --- Identity and position ---

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn audio(&self) -> Option<Arc<Audio>> {
        self.audio.upgrade()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn pad(&self) -> u32 {
        self.pad.load(Ordering::Relaxed)
    }

    pub fn audio_channel(&self) -> u32 {
        self.audio_channel.load(Ordering::Relaxed)
    }

    pub fn line(&self) -> u32 {
        self.line.load(Ordering::Relaxed)
    }

    pub(crate) fn set_position(&self, pad: u32, audio_channel: u32, line: u32) {
        self.pad.store(pad, Ordering::Relaxed);
        self.audio_channel.store(audio_channel, Ordering::Relaxed);
        self.line.store(line, Ordering::Relaxed);
    }

    /// Human readable name, e.g. `drum:out0`.
    pub fn name(&self) -> String {
        let audio = self.audio().map(|a| a.name().to_string()).unwrap_or_default();
        format!("{}:{}{}", audio, self.direction.short_name(), self.line())
    }

    pub fn playback(&self) -> &Arc<Playback> {
        &self.playback
    }

    // --- Orderings ---

    fn sibling(&self, pad: i64, audio_channel: i64) -> Option<Arc<Channel>> {
        let audio = self.audio()?;
        let channels = audio.audio_channels() as i64;
        if pad < 0 || audio_channel < 0 || audio_channel >= channels {
            return None;
        }
        audio.channel_at(self.direction, pad as u32, audio_channel as u32)
    }

    /// Next audio channel within this pad.
    pub fn next(&self) -> Option<Arc<Channel>> {
        self.sibling(self.pad() as i64, self.audio_channel() as i64 + 1)
    }

    pub fn prev(&self) -> Option<Arc<Channel>> {
        self.sibling(self.pad() as i64, self.audio_channel() as i64 - 1)
    }

    /// Same audio channel in the next pad.
    pub fn next_pad(&self) -> Option<Arc<Channel>> {
        self.sibling(self.pad() as i64 + 1, self.audio_channel() as i64)
    }

    pub fn prev_pad(&self) -> Option<Arc<Channel>> {
        self.sibling(self.pad() as i64 - 1, self.audio_channel() as i64)
    }

    // --- Link ---

    pub fn link(&self) -> Option<Arc<Channel>> {
        self.state.with(|s| s.link.upgrade())
    }

    pub fn is_linked(&self) -> bool {
        self.link().is_some()
    }

    pub(crate) fn set_link_raw(&self, link: Weak<Channel>) {
        self.state.with_mut(|s| s.link = link);
    }

    // --- Recyclings ---

    /// The recycling this channel owns, if its audio gives it one.
    pub fn own_recycling(&self) -> Option<Arc<Recycling>> {
        self.state.with(|s| s.recycling.clone())
    }

    /// Recyclings this channel reads and writes.
    ///
    /// An input without its own recycling uses its linked output's; an
    /// output without one uses its mapped inputs'.
    pub fn recyclings(&self) -> Vec<Arc<Recycling>> {
        if let Some(own) = self.own_recycling() {
            return vec![own];
        }
        match self.direction {
            Direction::Input => self.link().map(|l| l.recyclings()).unwrap_or_default(),
            Direction::Output => self
                .mapped()
                .iter()
                .flat_map(|input| input.recyclings())
                .collect(),
        }
    }

    /// Channels of the other direction this one maps to within its audio.
    pub fn mapped(&self) -> Vec<Arc<Channel>> {
        let Some(audio) = self.audio() else {
            return Vec::new();
        };
        match self.direction {
            Direction::Output => audio.mapped_inputs(self),
            Direction::Input => audio.mapped_outputs(self),
        }
    }

    /// Whether a recycling of this channel still holds voice signals.
    pub fn has_live_signals(&self) -> bool {
        self.own_recycling().is_some_and(|r| r.has_live_signals())
    }

    // --- Presets ---

    pub fn presets(&self) -> Presets {
        self.state.with(|s| s.presets)
    }

    /// Apply presets to the channel and its own recycling with its signals.
    pub fn apply_presets(&self, presets: &Presets) {
        let recycling = self.state.with_mut(|s| {
            s.presets = *presets;
            s.recycling.clone()
        });
        if let Some(r) = recycling {
            r.apply_presets(presets);
        }
    }

    // --- Recalls ---

    pub fn recalls(&self, list: RecallList) -> Vec<Arc<Recall>> {
        self.state.with(|s| match list {
            RecallList::Play => s.play.clone(),
            RecallList::Recall => s.recall.clone(),
        })
    }

    /// Templates of `list`.
    pub fn templates(&self, list: RecallList) -> Vec<Arc<Recall>> {
        self.recalls(list)
            .into_iter()
            .filter(|r| r.is_template())
            .collect()
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

    /// Template of `effect` in `list`.
    pub fn find_template(&self, effect: &str, list: RecallList) -> Option<Arc<Recall>> {
        self.recalls(list)
            .into_iter()
            .find(|r| r.is_template() && r.effect() == effect)
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

    // --- Connection ---

    pub fn is_connected(&self) -> bool {
        self.state.with(|s| s.connected)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.state.with_mut(|s| s.connected = connected);
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("pad", &self.pad())
            .field("audio_channel", &self.audio_channel())
            .finish()
    }
}
