//! midir-based sequencer input.

use midir::{MidiInput, MidiInputConnection};
use tw_ir::Presets;

use crate::error::{AudioError, AudioResult};
use crate::sequencer::{Sequencer, SequencerCore};

const CLIENT_NAME: &str = "tickwork";

/// Information about an available MIDI input port.
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// List the MIDI input ports of the system.
pub fn list_ports() -> AudioResult<Vec<MidiPortInfo>> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| AudioError::Midi(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_in
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect())
}

pub struct MidirSequencer {
    name: String,
    port: Option<String>,
    core: SequencerCore,
    connection: Option<MidiInputConnection<()>>,
}

impl MidirSequencer {
    /// `port` selects an input by name substring; `None` takes the first port.
    pub fn new(port: Option<String>, presets: Presets) -> Self {
        Self {
            name: "midir".into(),
            port,
            core: SequencerCore::new(presets),
            connection: None,
        }
    }

    fn connect(&mut self) -> AudioResult<()> {
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| AudioError::Midi(e.to_string()))?;
        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| match (&self.port, midi_in.port_name(p)) {
                (Some(wanted), Ok(name)) => name.contains(wanted.as_str()),
                (None, Ok(_)) => true,
                (_, Err(_)) => false,
            })
            .ok_or(AudioError::NoDevice)?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "unknown".to_string());

        let incoming = self.core.incoming();
        let connection = midi_in
            .connect(
                port,
                "tickwork-input",
                move |_timestamp, message, _| {
                    incoming.lock().extend_from_slice(message);
                },
                (),
            )
            .map_err(|e| AudioError::Midi(e.to_string()))?;

        log::info!(target: "sequencer", "connected to midi port {}", port_name);
        self.name = port_name;
        self.connection = Some(connection);
        Ok(())
    }
}

impl Sequencer for MidirSequencer {
    fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> &SequencerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SequencerCore {
        &mut self.core
    }

    fn start(&mut self) -> AudioResult<()> {
        if self.connection.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            log::debug!(target: "sequencer", "{} disconnected", self.name);
        }
    }

    fn is_running(&self) -> bool {
        self.connection.is_some()
    }
}

impl Drop for MidirSequencer {
    fn drop(&mut self) {
        self.stop();
    }
}
