//! Serializable snapshots of audios and the links between them.
//!
//! A snapshot keeps what is needed to rebuild a graph: flags, presets,
//! topology, effect containers with their port values, input patterns,
//! recycling templates and output links. Voices are not captured.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tw_ir::{Pattern, PortValue, Presets};

use crate::audio::Audio;
use crate::channel::{Channel, Direction};
use crate::error::{GraphError, GraphResult};
use crate::link::link;
use crate::recall::effects::pattern::{pattern_of, with_pattern};
use crate::recall::{RecallContainer, RecallFactory, RecallList, Target};
use crate::signal::AudioSignal;

/// Output link to an input of another captured audio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    /// Index of the audio in [`GraphSnapshot::audios`].
    pub audio: usize,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub direction: Direction,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Samples of the own recycling's template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<f32>>,
}

/// One effect container.
///
/// `direction` is `None` for audio level effects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecallSnapshot {
    pub effect: String,
    pub list: RecallList,
    pub direction: Option<Direction>,
    #[serde(default)]
    pub lines: Vec<u32>,
    #[serde(default)]
    pub ports: BTreeMap<String, PortValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioSnapshot {
    pub name: String,
    pub flags: u32,
    pub presets: Presets,
    pub bpm: f64,
    pub audio_channels: u32,
    pub output_pads: u32,
    pub input_pads: u32,
    #[serde(default)]
    pub channels: Vec<ChannelSnapshot>,
    #[serde(default)]
    pub recalls: Vec<RecallSnapshot>,
}

impl AudioSnapshot {
    /// Capture `audio`. Links are left out, see [`GraphSnapshot`].
    pub fn capture(audio: &Audio) -> Self {
        let mut channels = Vec::new();
        for direction in [Direction::Output, Direction::Input] {
            for channel in audio.channels(direction) {
                channels.push(ChannelSnapshot {
                    direction,
                    line: channel.line(),
                    link: None,
                    pattern: match direction {
                        Direction::Input => pattern_of(audio, channel.line()).ok(),
                        Direction::Output => None,
                    },
                    template: own_template(&channel),
                });
            }
        }
        let recalls = audio.containers().iter().flat_map(|c| capture_container(c)).collect();

        Self {
            name: audio.name().to_string(),
            flags: audio.flags(),
            presets: audio.presets(),
            bpm: audio.bpm(),
            audio_channels: audio.audio_channels(),
            output_pads: audio.pads(Direction::Output),
            input_pads: audio.pads(Direction::Input),
            channels,
            recalls,
        }
    }

    /// Build a new audio from the snapshot, without links.
    pub fn restore(&self) -> GraphResult<Arc<Audio>> {
        let audio = Audio::new(&self.name, self.flags, &self.presets);
        audio.resize(self.audio_channels, self.output_pads, self.input_pads)?;
        audio.set_bpm(self.bpm);

        for recall in &self.recalls {
            restore_container(&audio, recall)?;
        }
        for channel in &self.channels {
            if let Some(pattern) = &channel.pattern {
                with_pattern(&audio, channel.line, |p| *p = pattern.clone())?;
            }
            if let Some(samples) = &channel.template {
                let target = audio.channel(channel.direction, channel.line)?;
                if let Some(recycling) = target.own_recycling() {
                    let template = AudioSignal::template_from_samples(&recycling.presets(), samples);
                    recycling.set_template(Arc::new(template));
                }
            }
        }
        debug!(target: "graph", "restored {} with {} containers", audio.name(), self.recalls.len());
        Ok(audio)
    }
}

fn own_template(channel: &Channel) -> Option<Vec<f32>> {
    let template = channel.own_recycling()?.template()?;
    if template.is_empty() {
        return None;
    }
    Some(template.with(|s| s.samples()))
}

fn capture_container(container: &RecallContainer) -> Vec<RecallSnapshot> {
    let ports: BTreeMap<String, PortValue> = container
        .ports()
        .iter()
        .map(|p| {
            let port = p.lock();
            (port.name.to_string(), port.value())
        })
        .collect();

    let mut by_direction: BTreeMap<u8, (Direction, Vec<u32>)> = BTreeMap::new();
    for template in container.templates() {
        if let Some(channel) = template.channel() {
            let direction = channel.direction();
            let entry = by_direction
                .entry(direction as u8)
                .or_insert_with(|| (direction, Vec::new()));
            if !entry.1.contains(&channel.line()) {
                entry.1.push(channel.line());
            }
        }
    }

    let snapshot = |direction, lines| RecallSnapshot {
        effect: container.effect().to_string(),
        list: container.list(),
        direction,
        lines,
        ports: ports.clone(),
    };
    if by_direction.is_empty() {
        return vec![snapshot(None, Vec::new())];
    }
    by_direction
        .into_values()
        .map(|(direction, mut lines)| {
            lines.sort_unstable();
            snapshot(Some(direction), lines)
        })
        .collect()
}

fn restore_container(audio: &Arc<Audio>, recall: &RecallSnapshot) -> GraphResult<()> {
    let flags = match recall.list {
        RecallList::Play => RecallFactory::PLAY,
        RecallList::Recall => RecallFactory::RECALL,
    };
    let mut containers = Vec::new();
    match recall.direction {
        None => containers.extend(RecallFactory::create(audio, &recall.effect, Target::outputs(audio), flags)?),
        Some(direction) => {
            for &line in &recall.lines {
                containers.extend(RecallFactory::create(
                    audio,
                    &recall.effect,
                    Target::new(direction, line..line + 1),
                    flags,
                )?);
            }
        }
    }

    let Some(container) = containers.first() else {
        return Ok(());
    };
    for (name, value) in &recall.ports {
        match container.ports().iter().find(|p| p.lock().name.as_str() == name) {
            Some(port) => port.lock().set(*value),
            None => warn!(target: "graph", "{}: no port {name}", recall.effect),
        }
    }
    Ok(())
}

/// A set of audios and the links between them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub audios: Vec<AudioSnapshot>,
}

impl GraphSnapshot {
    /// Capture `audios`. Links to audios outside the set are dropped.
    pub fn capture(audios: &[Arc<Audio>]) -> Self {
        let mut snapshots: Vec<AudioSnapshot> = audios.iter().map(|a| AudioSnapshot::capture(a)).collect();
        for (snapshot, audio) in snapshots.iter_mut().zip(audios) {
            for channel in snapshot.channels.iter_mut().filter(|c| c.direction == Direction::Output) {
                let Ok(output) = audio.channel(Direction::Output, channel.line) else {
                    continue;
                };
                let Some(input) = output.link() else {
                    continue;
                };
                let index = input
                    .audio()
                    .and_then(|target| audios.iter().position(|a| a.id() == target.id()));
                match index {
                    Some(audio) => {
                        channel.link = Some(LinkSnapshot {
                            audio,
                            line: input.line(),
                        })
                    }
                    None => debug!(target: "graph", "{} links outside the snapshot", output.name()),
                }
            }
        }
        Self { audios: snapshots }
    }

    /// Rebuild every audio, then the links.
    pub fn restore(&self) -> GraphResult<Vec<Arc<Audio>>> {
        let audios = self
            .audios
            .iter()
            .map(AudioSnapshot::restore)
            .collect::<GraphResult<Vec<_>>>()?;

        for (snapshot, audio) in self.audios.iter().zip(&audios) {
            for channel in &snapshot.channels {
                let Some(target) = &channel.link else {
                    continue;
                };
                let other = audios.get(target.audio).ok_or_else(|| {
                    GraphError::InvalidChannelType(format!("link to missing audio {}", target.audio))
                })?;
                let output = audio.channel(Direction::Output, channel.line)?;
                let input = other.channel(Direction::Input, target.line)?;
                link(&output, &input)?;
            }
        }
        Ok(audios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flags;
    use crate::recall::effects::pattern::set_step;

    fn drum() -> Arc<Audio> {
        let a = Audio::new(
            "drum",
            flags::OUTPUT_HAS_RECYCLING | flags::INPUT_HAS_RECYCLING | flags::ASYNC,
            &Presets::default(),
        );
        a.resize(2, 1, 4).unwrap();
        for effect in ["delay", "count-beats"] {
            RecallFactory::create(&a, effect, Target::outputs(&a), RecallFactory::PLAY).unwrap();
        }
        RecallFactory::create(&a, "pattern", Target::inputs(&a), RecallFactory::PLAY).unwrap();
        RecallFactory::create(&a, "volume", Target::outputs(&a), RecallFactory::PLAY).unwrap();
        a
    }

    fn mixer() -> Arc<Audio> {
        let a = Audio::new("mixer", flags::INPUT_HAS_RECYCLING | flags::SYNC, &Presets::default());
        a.resize(2, 1, 1).unwrap();
        a
    }

    #[test]
    fn audio_round_trip() {
        let a = drum();
        set_step(&a, 3, 5, true).unwrap();
        a.find_container("volume", RecallList::Play).unwrap().ports()[0]
            .lock()
            .set(PortValue::Float(0.5));

        let snapshot = AudioSnapshot::capture(&a);
        assert_eq!(snapshot.channels.len(), 2 + 8);
        let volume = snapshot.recalls.iter().find(|r| r.effect == "volume").unwrap();
        assert_eq!(volume.direction, Some(Direction::Output));
        assert_eq!(volume.lines, vec![0, 1]);

        let b = snapshot.restore().unwrap();
        assert_eq!(b.channel_count(Direction::Input), 8);
        assert_eq!(b.flags(), a.flags());
        assert!(pattern_of(&b, 3).unwrap().is_on(0, 5));
        assert!(!pattern_of(&b, 2).unwrap().is_on(0, 5));
        assert_eq!(
            b.find_container("volume", RecallList::Play).unwrap().port_value("volume"),
            Some(PortValue::Float(0.5))
        );
        assert_eq!(AudioSnapshot::capture(&b), snapshot);
    }

    #[test]
    fn links_survive_json() {
        let drum = drum();
        let mixer = mixer();
        link(&drum.channel(Direction::Output, 1).unwrap(), &mixer.channel(Direction::Input, 0).unwrap()).unwrap();

        let snapshot = GraphSnapshot::capture(&[drum.clone(), mixer.clone()]);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: GraphSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);

        let audios = back.restore().unwrap();
        let out = audios[0].channel(Direction::Output, 1).unwrap();
        let partner = out.link().unwrap();
        assert_eq!(partner.audio().unwrap().id(), audios[1].id());
        assert!(!audios[0].channel(Direction::Output, 0).unwrap().is_linked());
    }

    #[test]
    fn links_outside_the_set_are_dropped() {
        let drum = drum();
        let mixer = mixer();
        link(&drum.channel(Direction::Output, 0).unwrap(), &mixer.channel(Direction::Input, 0).unwrap()).unwrap();
        let snapshot = GraphSnapshot::capture(&[drum]);
        assert!(snapshot.audios[0].channels.iter().all(|c| c.link.is_none()));
    }
}
