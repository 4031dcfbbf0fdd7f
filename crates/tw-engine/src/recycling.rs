//! Recyclings: the live signal set of one channel.

use std::sync::Arc;

use tw_ir::Presets;

use crate::object::{next_id, ObjectMutex};
use crate::signal::AudioSignal;

#[derive(Debug)]
struct RecyclingState {
    presets: Presets,
    signals: Vec<Arc<AudioSignal>>,
}

/// Container of the audio signals currently alive on a channel.
///
/// Holds at most one template signal plus any number of voice signals.
#[derive(Debug)]
pub struct Recycling {
    id: u64,
    state: ObjectMutex<RecyclingState>,
}

impl Recycling {
    /// A recycling holding only a silent template.
    pub fn new(presets: &Presets) -> Arc<Self> {
        let recycling = Arc::new(Self {
            id: next_id(),
            state: ObjectMutex::new(RecyclingState {
                presets: *presets,
                signals: Vec::new(),
            }),
        });
        recycling.ensure_template();
        recycling
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn presets(&self) -> Presets {
        self.state.with(|s| s.presets)
    }

    pub fn signals(&self) -> Vec<Arc<AudioSignal>> {
        self.state.with(|s| s.signals.clone())
    }

    pub fn template(&self) -> Option<Arc<AudioSignal>> {
        self.state
            .with(|s| s.signals.iter().find(|sig| sig.is_template()).cloned())
    }

    /// Return the template, creating a silent one if there is none.
    pub fn ensure_template(&self) -> Arc<AudioSignal> {
        self.state.with_mut(|s| {
            if let Some(t) = s.signals.iter().find(|sig| sig.is_template()) {
                return t.clone();
            }
            let template = Arc::new(AudioSignal::template(&s.presets));
            s.signals.insert(0, template.clone());
            template
        })
    }

    /// Replace the template. The old template, if any, is released.
    pub fn set_template(&self, template: Arc<AudioSignal>) {
        self.state.with_mut(|s| {
            s.signals.retain(|sig| !sig.is_template());
            s.signals.insert(0, template);
        });
    }

    /// Add a signal. Adding a template replaces the existing one.
    pub fn add_signal(&self, signal: Arc<AudioSignal>) {
        if signal.is_template() {
            self.set_template(signal);
            return;
        }
        self.state.with_mut(|s| {
            if !s.signals.iter().any(|sig| sig.id() == signal.id()) {
                s.signals.push(signal);
            }
        });
    }

    /// Remove a signal by id. Returns whether it was present.
    pub fn remove_signal(&self, id: u64) -> bool {
        self.state.with_mut(|s| {
            let before = s.signals.len();
            s.signals.retain(|sig| sig.id() != id);
            s.signals.len() != before
        })
    }

    /// Signals produced by voice `recall_id`.
    pub fn voice_signals(&self, recall_id: u64) -> Vec<Arc<AudioSignal>> {
        self.state.with(|s| {
            s.signals
                .iter()
                .filter(|sig| sig.belongs_to(recall_id))
                .cloned()
                .collect()
        })
    }

    /// Remove every signal of voice `recall_id`. Returns how many were removed.
    pub fn release_voice(&self, recall_id: u64) -> usize {
        self.state.with_mut(|s| {
            let before = s.signals.len();
            s.signals.retain(|sig| !sig.belongs_to(recall_id));
            before - s.signals.len()
        })
    }

    /// Remove voice signals that have played to the end.
    pub fn release_exhausted(&self) -> usize {
        self.state.with_mut(|s| {
            let before = s.signals.len();
            s.signals
                .retain(|sig| sig.is_template() || !sig.is_exhausted());
            before - s.signals.len()
        })
    }

    /// Whether any signal other than the template is alive.
    pub fn has_live_signals(&self) -> bool {
        self.state
            .with(|s| s.signals.iter().any(|sig| !sig.is_template()))
    }

    pub fn live_count(&self) -> usize {
        self.state
            .with(|s| s.signals.iter().filter(|sig| !sig.is_template()).count())
    }

    /// Apply presets to the recycling and every signal in it.
    pub fn apply_presets(&self, presets: &Presets) {
        let signals = self.state.with_mut(|s| {
            s.presets = *presets;
            s.signals.clone()
        });
        for signal in signals {
            signal.apply_presets(presets);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_recycling_has_one_template() {
        let r = Recycling::new(&Presets::default());
        assert!(r.template().is_some());
        assert_eq!(r.signals().len(), 1);
        assert!(!r.has_live_signals());

        let again = r.ensure_template();
        assert_eq!(again.id(), r.template().unwrap().id());
        assert_eq!(r.signals().len(), 1);
    }

    #[test]
    fn adding_a_template_replaces_it() {
        let presets = Presets::default();
        let r = Recycling::new(&presets);
        let t = Arc::new(AudioSignal::template_from_samples(&presets, &[0.5; 10]));
        r.add_signal(t.clone());
        assert_eq!(r.signals().len(), 1);
        assert_eq!(r.template().unwrap().id(), t.id());
    }

    #[test]
    fn voices_are_released_by_id() {
        let presets = Presets::default();
        let r = Recycling::new(&presets);
        r.add_signal(Arc::new(AudioSignal::new(&presets, Some(1))));
        r.add_signal(Arc::new(AudioSignal::new(&presets, Some(1))));
        r.add_signal(Arc::new(AudioSignal::new(&presets, Some(2))));
        assert_eq!(r.live_count(), 3);
        assert_eq!(r.voice_signals(1).len(), 2);

        assert_eq!(r.release_voice(1), 2);
        assert_eq!(r.live_count(), 1);
        assert!(r.template().is_some());
    }
}
