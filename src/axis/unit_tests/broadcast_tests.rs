use std::sync::Arc;

use super::{run, words};
use crate::axis::broadcast::{Broadcast, BroadcastConfig, BroadcastMode};
use crate::base::port::link;
use crate::sim::driver::{make_frame, ReadyPattern, StreamSink, StreamSource};

fn bench(
    mode: BroadcastMode,
    sinks: Vec<StreamSink>,
) -> (Vec<StreamSource>, Broadcast, Vec<StreamSink>) {
    let config = BroadcastConfig {
        m_count: sinks.len(),
        mode,
        ..BroadcastConfig::default()
    };
    let mut bcast = Broadcast::new("bcast", Arc::new(config)).unwrap();
    let mut src = vec![StreamSource::new(0)];
    link(&mut src[0].m_axis, &mut bcast.s_axis);
    let mut sinks = sinks;
    for (port, sink) in bcast.m_axis.iter_mut().zip(sinks.iter_mut()) {
        link(port, &mut sink.s_axis);
    }
    (src, bcast, sinks)
}

fn never_ready() -> StreamSink {
    StreamSink::new(ReadyPattern::Script(vec![false]), 0)
}

#[test]
fn lock_step_waits_for_every_output() {
    let sinks = vec![StreamSink::always(), never_ready()];
    let (mut src, mut bcast, mut sinks) = bench(BroadcastMode::LockStep, sinks);
    let data = (0..6).collect::<Vec<u64>>();
    src[0].push_frame(make_frame(&data, 4, 0, 0, 0));

    run(&mut src, &mut [&mut bcast], &mut sinks, 10);
    assert!(sinks[0].beats().is_empty());
    assert!(sinks[1].beats().is_empty());

    sinks[1].set_pattern(ReadyPattern::Always);
    run(&mut src, &mut [&mut bcast], &mut sinks, 20);
    assert_eq!(data, words(&sinks[0].beats()));
    assert_eq!(sinks[0].received(), sinks[1].received());
    assert_eq!(6, bcast.beats());
}

#[test]
fn lock_step_outputs_transfer_in_same_cycle() {
    let sinks = vec![
        StreamSink::new(ReadyPattern::Random(0.6), 1),
        StreamSink::new(ReadyPattern::Random(0.6), 2),
        StreamSink::new(ReadyPattern::Random(0.9), 3),
    ];
    let (mut src, mut bcast, mut sinks) = bench(BroadcastMode::LockStep, sinks);
    let data = (0..40).collect::<Vec<u64>>();
    src[0].push_frame(make_frame(&data, 4, 0, 0, 0));

    run(&mut src, &mut [&mut bcast], &mut sinks, 500);

    assert_eq!(data, words(&sinks[0].beats()));
    assert_eq!(sinks[0].received(), sinks[1].received());
    assert_eq!(sinks[0].received(), sinks[2].received());
    assert!(sinks.iter().all(|s| s.violations().is_empty()));
}

#[test]
fn disabled_output_does_not_hold_back_others() {
    let sinks = vec![StreamSink::always(), never_ready()];
    let (mut src, mut bcast, mut sinks) = bench(BroadcastMode::LockStep, sinks);
    bcast.set_enable(&[true, false]);
    src[0].push_frame(make_frame(&[1, 2, 3], 4, 0, 0, 0));

    run(&mut src, &mut [&mut bcast], &mut sinks, 10);

    assert_eq!(vec![1, 2, 3], words(&sinks[0].beats()));
    assert!(sinks[1].beats().is_empty());
}

#[test]
fn decoupled_outputs_drain_independently() {
    let sinks = vec![
        StreamSink::always(),
        StreamSink::new(ReadyPattern::Random(0.3), 5),
    ];
    let (mut src, mut bcast, mut sinks) = bench(BroadcastMode::Decoupled { depth: 4 }, sinks);
    let data = (0..20).collect::<Vec<u64>>();
    src[0].push_frame(make_frame(&data, 4, 0, 0, 0));

    run(&mut src, &mut [&mut bcast], &mut sinks, 400);

    assert_eq!(data, words(&sinks[0].beats()));
    assert_eq!(data, words(&sinks[1].beats()));
    assert!(sinks.iter().all(|s| s.violations().is_empty()));
    // the fast output ran ahead of the slow one at some point
    assert_ne!(sinks[0].received(), sinks[1].received());
}

#[test]
fn reenabled_output_with_full_queue_stalls_input() {
    let sinks = vec![StreamSink::always(), never_ready()];
    let (mut src, mut bcast, mut sinks) = bench(BroadcastMode::Decoupled { depth: 2 }, sinks);
    let data = (0..20).collect::<Vec<u64>>();
    src[0].push_frame(make_frame(&data, 4, 0, 0, 0));

    run(&mut src, &mut [&mut bcast], &mut sinks, 10);
    let stalled = bcast.beats();
    assert!(stalled < 20);

    bcast.set_enable(&[true, false]);
    run(&mut src, &mut [&mut bcast], &mut sinks, 2);
    assert!(bcast.beats() > stalled);

    // output 1 still has a full queue when it comes back
    bcast.set_enable(&[true, true]);
    let accepted = bcast.beats();
    run(&mut src, &mut [&mut bcast], &mut sinks, 5);
    assert_eq!(accepted, bcast.beats());

    sinks[1].set_pattern(ReadyPattern::Always);
    run(&mut src, &mut [&mut bcast], &mut sinks, 80);

    assert_eq!(data, words(&sinks[0].beats()));
    let slow = words(&sinks[1].beats());
    assert_eq!(vec![0u64, 1, 2], slow[..3].to_vec());
    assert!(slow.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(Some(&19), slow.last());
    assert!(sinks.iter().all(|s| s.violations().is_empty()));
}
