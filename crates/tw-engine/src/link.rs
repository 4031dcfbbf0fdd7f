//! Channel links: output to input patch cables.
//!
//! Both functions validate first and mutate only when every check passed.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::audio::{unlink_both, Audio};
use crate::channel::{Channel, Direction};
use crate::error::{GraphError, GraphResult};

/// Link `a` and `b`, one output and one input in any order.
///
/// Fails if either side is already linked or if the link would let the
/// output's audio reach itself downstream.
pub fn link(a: &Arc<Channel>, b: &Arc<Channel>) -> GraphResult<()> {
    let (output, input) = match (a.direction(), b.direction()) {
        (Direction::Output, Direction::Input) => (a, b),
        (Direction::Input, Direction::Output) => (b, a),
        _ => {
            return Err(GraphError::InvalidChannelType(format!(
                "{} and {} have the same direction",
                a.name(),
                b.name()
            )))
        }
    };
    for channel in [output, input] {
        if channel.is_linked() {
            return Err(GraphError::AlreadyLinked(channel.name()));
        }
    }

    let source = output.audio().ok_or(GraphError::AudioDropped)?;
    let target = input.audio().ok_or(GraphError::AudioDropped)?;
    if reaches(&target, source.id()) {
        return Err(GraphError::LoopInLink {
            source_channel: output.name(),
            target_channel: input.name(),
        });
    }

    output.set_link_raw(Arc::downgrade(input));
    input.set_link_raw(Arc::downgrade(output));
    debug!(target: "graph", "linked {} -> {}", output.name(), input.name());
    Ok(())
}

/// Remove the link of `channel` and its partner.
pub fn unlink(channel: &Arc<Channel>) -> GraphResult<()> {
    if !channel.is_linked() {
        return Err(GraphError::NotLinked(channel.name()));
    }
    unlink_both(channel);
    debug!(target: "graph", "unlinked {}", channel.name());
    Ok(())
}

/// Whether audio `source_id` is `from` or downstream of it.
fn reaches(from: &Arc<Audio>, source_id: u64) -> bool {
    let mut seen = HashSet::new();
    let mut queue = vec![from.clone()];
    while let Some(audio) = queue.pop() {
        if audio.id() == source_id {
            return true;
        }
        if !seen.insert(audio.id()) {
            continue;
        }
        for output in audio.outputs() {
            if let Some(next) = output.link().and_then(|input| input.audio()) {
                queue.push(next);
            }
        }
    }
    false
}
