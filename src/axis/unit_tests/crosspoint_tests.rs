use std::sync::Arc;

use super::{run, words};
use crate::axis::crosspoint::{Crosspoint, CrosspointConfig};
use crate::base::port::link;
use crate::sim::driver::{make_frame, ReadyPattern, StreamSink, StreamSource};

fn bench(sinks: Vec<StreamSink>) -> (Vec<StreamSource>, Crosspoint, Vec<StreamSink>) {
    let config = CrosspointConfig {
        s_count: 2,
        m_count: sinks.len(),
        ..CrosspointConfig::default()
    };
    let mut xp = Crosspoint::new("xp", Arc::new(config)).unwrap();
    let mut src = vec![StreamSource::new(0), StreamSource::new(1)];
    for (s, port) in src.iter_mut().zip(xp.s_axis.iter_mut()) {
        link(&mut s.m_axis, port);
    }
    let mut sinks = sinks;
    for (port, sink) in xp.m_axis.iter_mut().zip(sinks.iter_mut()) {
        link(port, &mut sink.s_axis);
    }
    (src, xp, sinks)
}

#[test]
fn swapped_select_crosses_streams_two_cycles_later() {
    let (mut src, mut xp, mut sinks) = bench(vec![StreamSink::always(), StreamSink::always()]);
    assert_eq!(&[0, 1], xp.select());
    xp.set_select(&[1, 0]);
    src[0].push_frame(make_frame(&[1, 2, 3], 4, 0, 0, 0));
    src[1].push_frame(make_frame(&[9], 4, 0, 0, 0));

    run(&mut src, &mut [&mut xp], &mut sinks, 10);

    assert_eq!(vec![9], words(&sinks[0].beats()));
    assert_eq!(vec![1, 2, 3], words(&sinks[1].beats()));
    let cycles = sinks[1].received().iter().map(|(c, _)| *c).collect::<Vec<_>>();
    assert_eq!(vec![3, 4, 5], cycles);
}

#[test]
fn one_input_fans_out_to_many_outputs() {
    let sinks = vec![StreamSink::always(), StreamSink::always(), StreamSink::always()];
    let (mut src, mut xp, mut sinks) = bench(sinks);
    xp.set_select(&[0, 0, 0]);
    src[0].push_frame(make_frame(&[4, 5], 4, 0, 0, 0));

    run(&mut src, &mut [&mut xp], &mut sinks, 10);

    for sink in &sinks {
        assert_eq!(vec![4, 5], words(&sink.beats()));
    }
}

#[test]
fn stalled_sink_loses_beats() {
    let sinks = vec![StreamSink::new(ReadyPattern::Script(vec![false]), 0)];
    let (mut src, mut xp, mut sinks) = bench(sinks);
    src[0].push_frame(make_frame(&[1, 2, 3], 4, 0, 0, 0));

    run(&mut src, &mut [&mut xp], &mut sinks, 10);
    sinks[0].set_pattern(ReadyPattern::Always);
    run(&mut src, &mut [&mut xp], &mut sinks, 10);

    assert!(src[0].is_done());
    assert!(sinks[0].beats().is_empty());
}
