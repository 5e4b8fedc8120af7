//! Scenario replay
//!
//! Plays each transport script through a `Dispatcher` the way a native
//! engine would report it. Transports are independent streams: with
//! `parallel` set they run on the rayon pool, one task per transport, so the
//! order inside a transport is kept while transports interleave.

use crate::config::{Scenario, Step, TransportScript};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use sylph_bridge::{ChannelId, Delivery, DispatchStats, Dispatcher};

/// Outcome of replaying one transport script
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportOutcome {
    pub label: String,
    pub transport: u64,
    pub emitted: usize,
    pub rejected: usize,
}

/// Outcome of a whole replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub transports: Vec<TransportOutcome>,
    pub stats: DispatchStats,
    pub live_transports: Option<usize>,
    pub live_channels: Option<usize>,
}

/// Replay every transport of `scenario` through `dispatcher`
pub fn replay(scenario: &Scenario, dispatcher: &Dispatcher, parallel: bool) -> ReplaySummary {
    log::info!(
        "Replaying {} transport(s), {} step(s){}",
        scenario.transports.len(),
        scenario.step_count(),
        if parallel { " in parallel" } else { "" }
    );

    let transports: Vec<TransportOutcome> = if parallel {
        scenario
            .transports
            .par_iter()
            .map(|script| replay_transport(script, dispatcher))
            .collect()
    } else {
        scenario
            .transports
            .iter()
            .map(|script| replay_transport(script, dispatcher))
            .collect()
    };

    let live = dispatcher.live_counts();
    ReplaySummary {
        transports,
        stats: dispatcher.stats(),
        live_transports: live.map(|(t, _)| t),
        live_channels: live.map(|(_, c)| c),
    }
}

fn replay_transport(script: &TransportScript, dispatcher: &Dispatcher) -> TransportOutcome {
    let ids = dispatcher.identifiers();
    let transport = ids.new_transport(script.label.as_str());
    log::debug!("Replaying {} as {}", script.label, transport);

    let mut outcome = TransportOutcome {
        label: script.label.clone(),
        transport: transport.raw(),
        ..TransportOutcome::default()
    };
    let mut channels: HashMap<&str, ChannelId> = HashMap::new();

    let mut note = |delivery: Delivery| {
        outcome.emitted += 1;
        if delivery.is_rejected() {
            outcome.rejected += 1;
        }
    };

    note(dispatcher.transport_opened(transport, script.role));

    for step in &script.steps {
        let label = step.channel();
        let channel = match step {
            Step::OpenChannel { .. } => {
                let channel = ids.new_channel(format!("{}/{}", script.label, label));
                channels.insert(label, channel);
                channel
            }
            _ => match channels.get(label) {
                Some(channel) => *channel,
                None => {
                    log::warn!("{}: skipping step on unknown channel {}", script.label, label);
                    continue;
                }
            },
        };

        let delivery = match step {
            Step::OpenChannel { .. } => dispatcher.channel_opened(transport, channel),
            Step::CloseChannel { .. } => {
                channels.remove(label);
                dispatcher.channel_closed(channel)
            }
            Step::Error { message, .. } => dispatcher.channel_error(channel, message),
            Step::Message { text, .. } => dispatcher.message_received(channel, text),
            Step::Data { bytes, .. } => dispatcher.data_received(channel, bytes),
        };
        note(delivery);
    }

    if !script.keep_open {
        note(dispatcher.transport_closed(transport, script.role));
    }

    outcome
}
