//! Staging flags: which lifecycle stages a recall has already performed.
//!
//! A recall only executes a stage when its bit is unset, then sets it. Run
//! bits are cleared by [`StagingFlags::RESET`] at the start of every tick,
//! init bits stay set for the lifetime of the voice.

use core::ops::{BitOr, BitOrAssign};

use crate::scope::{SoundScope, SCOPE_COUNT};

/// Bitset of recall stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StagingFlags(u16);

impl StagingFlags {
    pub const NONE: StagingFlags = StagingFlags(0);
    pub const RESET: StagingFlags = StagingFlags(1 << 0);
    pub const RUN_INIT_PRE: StagingFlags = StagingFlags(1 << 1);
    pub const RUN_INIT_INTER: StagingFlags = StagingFlags(1 << 2);
    pub const RUN_INIT_POST: StagingFlags = StagingFlags(1 << 3);
    pub const FEED_INPUT_QUEUE: StagingFlags = StagingFlags(1 << 4);
    pub const AUTOMATE: StagingFlags = StagingFlags(1 << 5);
    pub const RUN_PRE: StagingFlags = StagingFlags(1 << 6);
    pub const RUN_INTER: StagingFlags = StagingFlags(1 << 7);
    pub const RUN_POST: StagingFlags = StagingFlags(1 << 8);
    pub const DO_FEEDBACK: StagingFlags = StagingFlags(1 << 9);
    pub const FEED_OUTPUT_QUEUE: StagingFlags = StagingFlags(1 << 10);

    /// Stages run once per voice.
    pub const INIT: StagingFlags =
        StagingFlags(Self::RUN_INIT_PRE.0 | Self::RUN_INIT_INTER.0 | Self::RUN_INIT_POST.0);

    /// Stages run once per tick, cleared by `RESET`.
    pub const PER_TICK: StagingFlags = StagingFlags(
        Self::FEED_INPUT_QUEUE.0
            | Self::AUTOMATE.0
            | Self::RUN_PRE.0
            | Self::RUN_INTER.0
            | Self::RUN_POST.0
            | Self::DO_FEEDBACK.0
            | Self::FEED_OUTPUT_QUEUE.0,
    );

    /// Every stage in execution order.
    pub const ORDER: [StagingFlags; 11] = [
        Self::RESET,
        Self::RUN_INIT_PRE,
        Self::RUN_INIT_INTER,
        Self::RUN_INIT_POST,
        Self::FEED_INPUT_QUEUE,
        Self::AUTOMATE,
        Self::RUN_PRE,
        Self::RUN_INTER,
        Self::RUN_POST,
        Self::DO_FEEDBACK,
        Self::FEED_OUTPUT_QUEUE,
    ];

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn from_bits(bits: u16) -> Self {
        StagingFlags(bits)
    }

    pub const fn contains(self, other: StagingFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: StagingFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: StagingFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: StagingFlags) {
        self.0 &= !other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Stage name for logs.
    pub const fn name(self) -> &'static str {
        match self.0 {
            0x001 => "reset",
            0x002 => "run-init-pre",
            0x004 => "run-init-inter",
            0x008 => "run-init-post",
            0x010 => "feed-input-queue",
            0x020 => "automate",
            0x040 => "run-pre",
            0x080 => "run-inter",
            0x100 => "run-post",
            0x200 => "do-feedback",
            0x400 => "feed-output-queue",
            _ => "mixed",
        }
    }
}

impl BitOr for StagingFlags {
    type Output = StagingFlags;

    fn bitor(self, rhs: Self) -> Self {
        StagingFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for StagingFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Staging flags kept separately for every sound scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScopedStaging([StagingFlags; SCOPE_COUNT]);

impl ScopedStaging {
    pub fn get(&self, scope: SoundScope) -> StagingFlags {
        self.0[scope.index()]
    }

    /// Mark `stage` done in `scope`.
    ///
    /// Returns `false` if it was already set, meaning the caller must not
    /// run the stage again.
    pub fn try_advance(&mut self, scope: SoundScope, stage: StagingFlags) -> bool {
        let flags = &mut self.0[scope.index()];
        if flags.contains(stage) {
            return false;
        }
        flags.insert(stage);
        true
    }

    /// Clear the per-tick bits of `scope`.
    pub fn reset(&mut self, scope: SoundScope) {
        self.0[scope.index()].remove(StagingFlags::PER_TICK);
    }

    /// Clear everything in `scope`, including init bits.
    pub fn clear(&mut self, scope: SoundScope) {
        self.0[scope.index()] = StagingFlags::NONE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_one_shot_until_reset() {
        let mut staging = ScopedStaging::default();
        assert!(staging.try_advance(SoundScope::Sequencer, StagingFlags::RUN_PRE));
        assert!(!staging.try_advance(SoundScope::Sequencer, StagingFlags::RUN_PRE));
        // Other scopes are independent.
        assert!(staging.try_advance(SoundScope::Playback, StagingFlags::RUN_PRE));

        staging.reset(SoundScope::Sequencer);
        assert!(staging.try_advance(SoundScope::Sequencer, StagingFlags::RUN_PRE));
    }

    #[test]
    fn reset_keeps_init_bits() {
        let mut staging = ScopedStaging::default();
        staging.try_advance(SoundScope::Notation, StagingFlags::RUN_INIT_PRE);
        staging.try_advance(SoundScope::Notation, StagingFlags::RUN_POST);
        staging.reset(SoundScope::Notation);

        let flags = staging.get(SoundScope::Notation);
        assert!(flags.contains(StagingFlags::RUN_INIT_PRE));
        assert!(!flags.contains(StagingFlags::RUN_POST));

        staging.clear(SoundScope::Notation);
        assert!(staging.get(SoundScope::Notation).is_empty());
    }

    #[test]
    fn order_starts_with_reset_and_names_are_unique() {
        assert_eq!(StagingFlags::ORDER[0], StagingFlags::RESET);
        for (i, a) in StagingFlags::ORDER.iter().enumerate() {
            assert_ne!(a.name(), "mixed");
            for b in &StagingFlags::ORDER[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
        assert_eq!((StagingFlags::RUN_PRE | StagingFlags::RUN_POST).name(), "mixed");
    }
}
