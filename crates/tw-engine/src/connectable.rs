//! Connect/disconnect lifecycle of graph objects.
//!
//! A connected object takes part in the running engine. Connecting an
//! audio connects its channels and recall templates; disconnecting undoes
//! it in reverse.

use std::sync::Arc;

use log::debug;

use crate::audio::{flags as audio_flags, Audio};
use crate::channel::Channel;
use crate::recall::{flags as recall_flags, Recall, RecallList};

pub trait Connectable {
    fn connect(&self);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

const LISTS: [RecallList; 2] = [RecallList::Play, RecallList::Recall];

impl Connectable for Recall {
    fn connect(&self) {
        self.set_flag(recall_flags::CONNECTED, true);
    }

    fn disconnect(&self) {
        self.set_flag(recall_flags::CONNECTED, false);
    }

    fn is_connected(&self) -> bool {
        self.flags() & recall_flags::CONNECTED != 0
    }
}

impl Connectable for Channel {
    fn connect(&self) {
        if Connectable::is_connected(self) {
            return;
        }
        self.set_connected(true);
        for recall in LISTS.into_iter().flat_map(|l| self.templates(l)) {
            recall.connect();
        }
    }

    fn disconnect(&self) {
        if !Connectable::is_connected(self) {
            return;
        }
        for recall in LISTS.into_iter().flat_map(|l| self.templates(l)) {
            recall.disconnect();
        }
        self.set_connected(false);
    }

    fn is_connected(&self) -> bool {
        Channel::is_connected(self)
    }
}

fn audio_templates(audio: &Audio) -> Vec<Arc<Recall>> {
    LISTS
        .into_iter()
        .flat_map(|l| audio.recalls(l))
        .filter(|r| r.is_template())
        .collect()
}

impl Connectable for Audio {
    fn connect(&self) {
        if self.is_connected() {
            return;
        }
        self.set_flags(audio_flags::CONNECTED);
        for recall in audio_templates(self) {
            recall.connect();
        }
        for channel in self.outputs().into_iter().chain(self.inputs()) {
            channel.connect();
        }
        debug!(target: "graph", "connected {}", self.name());
    }

    fn disconnect(&self) {
        if !self.is_connected() {
            return;
        }
        for channel in self.outputs().into_iter().chain(self.inputs()) {
            channel.disconnect();
        }
        for recall in audio_templates(self) {
            recall.disconnect();
        }
        self.unset_flags(audio_flags::CONNECTED);
        debug!(target: "graph", "disconnected {}", self.name());
    }

    fn is_connected(&self) -> bool {
        self.has_flag(audio_flags::CONNECTED)
    }
}
