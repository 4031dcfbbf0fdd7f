//! Audios known to an engine, addressed by stable keys.

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::audio::Audio;

new_key_type! {
    /// Key of an audio in an [`AudioRegistry`].
    pub struct AudioKey;
}

#[derive(Default)]
pub struct AudioRegistry {
    audios: Mutex<SlotMap<AudioKey, Arc<Audio>>>,
}

impl AudioRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, audio: Arc<Audio>) -> AudioKey {
        self.audios.lock().insert(audio)
    }

    pub fn remove(&self, key: AudioKey) -> Option<Arc<Audio>> {
        self.audios.lock().remove(key)
    }

    pub fn get(&self, key: AudioKey) -> Option<Arc<Audio>> {
        self.audios.lock().get(key).cloned()
    }

    pub fn key_of(&self, audio: &Audio) -> Option<AudioKey> {
        self.audios
            .lock()
            .iter()
            .find(|(_, a)| a.id() == audio.id())
            .map(|(k, _)| k)
    }

    pub fn find(&self, name: &str) -> Option<(AudioKey, Arc<Audio>)> {
        self.audios
            .lock()
            .iter()
            .find(|(_, a)| a.name() == name)
            .map(|(k, a)| (k, a.clone()))
    }

    /// Every registered audio, in insertion order of their slots.
    pub fn audios(&self) -> Vec<Arc<Audio>> {
        self.audios.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.audios.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.audios.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_ir::Presets;

    #[test]
    fn keys_stay_valid_across_removal() {
        let registry = AudioRegistry::new();
        let a = registry.insert(Audio::new("a", 0, &Presets::default()));
        let b = registry.insert(Audio::new("b", 0, &Presets::default()));

        assert_eq!(registry.remove(a).unwrap().name(), "a");
        assert!(registry.get(a).is_none());
        assert_eq!(registry.get(b).unwrap().name(), "b");
        assert_eq!(registry.find("b").map(|(k, _)| k), Some(b));
        assert_eq!(registry.len(), 1);
    }
}
