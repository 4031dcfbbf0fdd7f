//! Playback helpers tying channels and audios to the thread tree.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tw_ir::{SoundScope, SCOPE_COUNT};
use tw_thread::Thread;

use crate::channel::Channel;
use crate::recall_id::RecallId;

#[derive(Default)]
struct ScopeSlot {
    recall_id: Option<Arc<RecallId>>,
    thread: Option<Arc<Thread>>,
}

/// Per-channel playback state: at most one voice and one channel thread per scope.
pub struct Playback {
    channel: Weak<Channel>,
    slots: Mutex<[ScopeSlot; SCOPE_COUNT]>,
}

impl Playback {
    pub(crate) fn new(channel: Weak<Channel>) -> Self {
        Self {
            channel,
            slots: Mutex::new(Default::default()),
        }
    }

    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.upgrade()
    }

    pub fn recall_id(&self, scope: SoundScope) -> Option<Arc<RecallId>> {
        self.slots.lock()[scope.index()].recall_id.clone()
    }

    pub fn thread(&self, scope: SoundScope) -> Option<Arc<Thread>> {
        self.slots.lock()[scope.index()].thread.clone()
    }

    pub fn is_playing(&self, scope: SoundScope) -> bool {
        self.recall_id(scope).is_some()
    }

    pub fn playing_scopes(&self) -> Vec<SoundScope> {
        let slots = self.slots.lock();
        SoundScope::ALL
            .into_iter()
            .filter(|s| slots[s.index()].recall_id.is_some())
            .collect()
    }

    pub(crate) fn set(&self, scope: SoundScope, recall_id: Arc<RecallId>, thread: Option<Arc<Thread>>) {
        let mut slots = self.slots.lock();
        slots[scope.index()] = ScopeSlot {
            recall_id: Some(recall_id),
            thread,
        };
    }

    /// Forget the voice of `scope` if it is `recall_id`.
    pub(crate) fn clear(&self, scope: SoundScope, recall_id: u64) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[scope.index()];
        if slot.recall_id.as_ref().is_some_and(|r| r.id() == recall_id) {
            *slot = ScopeSlot::default();
        }
    }
}

/// Per-audio view over the playbacks of its output channels.
pub struct PlaybackDomain {
    audio_id: u64,
    playbacks: Mutex<Vec<Arc<Playback>>>,
}

impl PlaybackDomain {
    pub(crate) fn new(audio_id: u64) -> Self {
        Self {
            audio_id,
            playbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn audio_id(&self) -> u64 {
        self.audio_id
    }

    pub fn playbacks(&self) -> Vec<Arc<Playback>> {
        self.playbacks.lock().clone()
    }

    pub(crate) fn set_playbacks(&self, playbacks: Vec<Arc<Playback>>) {
        *self.playbacks.lock() = playbacks;
    }

    /// Whether any output plays in `scope`.
    pub fn is_playing(&self, scope: SoundScope) -> bool {
        self.playbacks.lock().iter().any(|p| p.is_playing(scope))
    }

    /// Voices of all outputs in `scope`.
    pub fn recall_ids(&self, scope: SoundScope) -> Vec<Arc<RecallId>> {
        self.playbacks
            .lock()
            .iter()
            .filter_map(|p| p.recall_id(scope))
            .collect()
    }
}
