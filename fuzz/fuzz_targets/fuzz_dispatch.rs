#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use whoop_protocol::protocol::correlator::ResponseCorrelator;
use whoop_protocol::protocol::dispatcher::NotificationDispatcher;
use whoop_protocol::transport::presentation::TracingPresentation;
use whoop_protocol::transport::sink::{shared, ByteSink, MemorySink};
use whoop_protocol::transport::{Channel, Notification};
use whoop_protocol::utils::metrics::Metrics;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, bytes)) = data.split_first() else {
        return;
    };
    let channel = match selector % 3 {
        0 => Channel::Command,
        1 => Channel::Event,
        _ => Channel::Data,
    };

    let mut sink = MemorySink::new();
    if selector & 0x80 != 0 {
        let _ = sink.open();
    }

    let dispatcher = NotificationDispatcher::new(
        Arc::new(ResponseCorrelator::new("command")),
        Arc::new(ResponseCorrelator::new("metadata")),
        shared(sink),
        Arc::new(TracingPresentation),
        Arc::new(Metrics::new()),
    );

    // Arbitrary notifications must never panic the routing path
    let _ = dispatcher.dispatch(&Notification::new(channel, bytes));
});
