//! Sound scopes: the independent playback contexts a recall can run in.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of sound scopes.
pub const SCOPE_COUNT: usize = 5;

/// A playback context. Each active voice belongs to exactly one scope and
/// recalls keep separate staging state per scope.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SoundScope {
    /// Direct playback of a channel or audio.
    Playback,
    /// Pattern sequencer playback.
    Sequencer,
    /// Notation (piano roll) playback.
    Notation,
    /// Wave / arrangement playback.
    Wave,
    /// Real-time MIDI input monitoring.
    Midi,
}

impl SoundScope {
    pub const ALL: [SoundScope; SCOPE_COUNT] = [
        SoundScope::Playback,
        SoundScope::Sequencer,
        SoundScope::Notation,
        SoundScope::Wave,
        SoundScope::Midi,
    ];

    /// Stable index for per-scope arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            SoundScope::Playback => "playback",
            SoundScope::Sequencer => "sequencer",
            SoundScope::Notation => "notation",
            SoundScope::Wave => "wave",
            SoundScope::Midi => "midi",
        }
    }

    /// Bit for this scope in a [`ScopeMask`].
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A set of sound scopes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScopeMask(u8);

impl ScopeMask {
    pub const EMPTY: ScopeMask = ScopeMask(0);
    pub const ALL: ScopeMask = ScopeMask((1 << SCOPE_COUNT) - 1);

    pub const fn from_bits(bits: u8) -> Self {
        ScopeMask(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, scope: SoundScope) -> Self {
        ScopeMask(self.0 | scope.bit())
    }

    pub const fn contains(self, scope: SoundScope) -> bool {
        self.0 & scope.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = SoundScope> {
        SoundScope::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl From<SoundScope> for ScopeMask {
    fn from(scope: SoundScope) -> Self {
        ScopeMask::EMPTY.with(scope)
    }
}
