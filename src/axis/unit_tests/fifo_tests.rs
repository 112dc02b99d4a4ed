use std::sync::Arc;

use super::{run, words};
use crate::axis::fifo::{Fifo, FifoConfig};
use crate::base::beat::BeatFormat;
use crate::base::port::link;
use crate::base::status::StatusCounters;
use crate::sim::driver::{make_frame, ReadyPattern, StreamSink, StreamSource};

fn bench(config: FifoConfig, sink: StreamSink) -> (Vec<StreamSource>, Fifo, Vec<StreamSink>) {
    let mut sources = vec![StreamSource::new(1)];
    let mut sinks = vec![sink];
    let mut fifo = Fifo::new("fifo", Arc::new(config)).unwrap();
    link(&mut sources[0].m_axis, &mut fifo.s_axis);
    link(&mut fifo.m_axis, &mut sinks[0].s_axis);
    (sources, fifo, sinks)
}

fn frame_config(depth: usize) -> FifoConfig {
    FifoConfig {
        depth,
        format: BeatFormat::default().with_user_width(1),
        frame_fifo: true,
        ..FifoConfig::default()
    }
}

#[test]
fn passes_beats_in_order_under_backpressure() {
    let config = FifoConfig {
        depth: 8,
        ..FifoConfig::default()
    };
    let sink = StreamSink::new(ReadyPattern::Random(0.4), 7);
    let (mut src, mut fifo, mut sink) = bench(config, sink);
    let data = (0..20).collect::<Vec<u64>>();
    src[0].push_frame(make_frame(&data, 4, 0, 0, 0));

    run(&mut src, &mut [&mut fifo], &mut sink, 300);

    assert_eq!(data, words(&sink[0].beats()));
    assert!(sink[0].violations().is_empty());
    assert_eq!(1, fifo.counters().good_frame);
    assert_eq!(0, fifo.occupancy());
}

#[test]
fn frame_mode_releases_after_last_beat() {
    let (mut src, mut fifo, mut sink) = bench(frame_config(16), StreamSink::always());
    src[0].push_frame(make_frame(&[10, 11, 12, 13], 4, 0, 0, 0));

    run(&mut src, &mut [&mut fifo], &mut sink, 12);

    let cycles = sink[0].received().iter().map(|(c, _)| *c).collect::<Vec<_>>();
    assert_eq!(vec![5, 6, 7, 8], cycles);
    assert_eq!(vec![10, 11, 12, 13], words(&sink[0].beats()));
}

#[test]
fn bad_frames_are_dropped_and_counted() {
    let config = FifoConfig {
        drop_bad_frame: true,
        ..frame_config(16)
    };
    let (mut src, mut fifo, mut sink) = bench(config, StreamSink::always());
    src[0].push_frame(make_frame(&[1, 2], 4, 0, 0, 0));
    src[0].push_frame(make_frame(&[3, 4, 5], 4, 0, 0, 1));
    src[0].push_frame(make_frame(&[6], 4, 0, 0, 0));

    run(&mut src, &mut [&mut fifo], &mut sink, 30);

    assert_eq!(vec![1, 2, 6], words(&sink[0].beats()));
    assert_eq!(2, sink[0].frames().len());
    assert_eq!(
        StatusCounters {
            overflow: 0,
            bad_frame: 1,
            good_frame: 2
        },
        fifo.counters()
    );
}

#[test]
fn bad_frames_pass_when_drop_disabled() {
    let (mut src, mut fifo, mut sink) = bench(frame_config(16), StreamSink::always());
    src[0].push_frame(make_frame(&[3, 4], 4, 0, 0, 1));

    run(&mut src, &mut [&mut fifo], &mut sink, 12);

    assert_eq!(vec![3, 4], words(&sink[0].beats()));
    assert_eq!(1, sink[0].beats()[1].user);
    assert_eq!(0, fifo.counters().bad_frame);
}

#[test]
fn drop_when_full_discards_whole_frame() {
    let config = FifoConfig {
        drop_when_full: true,
        ..frame_config(4)
    };
    let stalled = StreamSink::new(ReadyPattern::Script(vec![false]), 0);
    let (mut src, mut fifo, mut sink) = bench(config, stalled);
    src[0].push_frame(make_frame(&[1, 2, 3], 4, 0, 0, 0));
    src[0].push_frame(make_frame(&[4, 5, 6], 4, 0, 0, 0));
    src[0].push_frame(make_frame(&[7, 8], 4, 0, 0, 0));

    run(&mut src, &mut [&mut fifo], &mut sink, 20);
    assert!(src[0].is_done());
    assert_eq!(1, fifo.counters().overflow);
    assert_eq!(2, fifo.counters().good_frame);

    sink[0].set_pattern(ReadyPattern::Always);
    run(&mut src, &mut [&mut fifo], &mut sink, 20);
    assert_eq!(vec![1, 2, 3, 7, 8], words(&sink[0].beats()));
}

#[test]
fn oversize_frame_is_dropped() {
    let config = FifoConfig {
        drop_oversize_frame: true,
        ..frame_config(4)
    };
    let (mut src, mut fifo, mut sink) = bench(config, StreamSink::always());
    src[0].push_frame(make_frame(&[1, 2, 3, 4, 5, 6], 4, 0, 0, 0));
    src[0].push_frame(make_frame(&[7, 8], 4, 0, 0, 0));

    run(&mut src, &mut [&mut fifo], &mut sink, 30);

    assert_eq!(vec![7, 8], words(&sink[0].beats()));
    assert_eq!(1, fifo.counters().overflow);
    assert_eq!(1, fifo.counters().good_frame);
}

#[test]
fn oversize_frame_cuts_through_without_drop() {
    let (mut src, mut fifo, mut sink) = bench(frame_config(4), StreamSink::always());
    let data = (0..10).collect::<Vec<u64>>();
    src[0].push_frame(make_frame(&data, 4, 0, 0, 0));

    run(&mut src, &mut [&mut fifo], &mut sink, 40);

    assert_eq!(data, words(&sink[0].beats()));
    assert_eq!(1, fifo.counters().good_frame);
    assert_eq!(0, fifo.counters().overflow);
}

#[test]
fn reset_clears_buffer_and_counters() {
    let stalled = StreamSink::new(ReadyPattern::Script(vec![false]), 0);
    let (mut src, mut fifo, mut sink) = bench(FifoConfig::default(), stalled);
    src[0].push_frame(make_frame(&[1, 2, 3], 4, 0, 0, 0));
    run(&mut src, &mut [&mut fifo], &mut sink, 10);
    assert_eq!(3, fifo.occupancy());

    crate::base::behavior::ModuleBehaviors::reset(&mut fifo);
    assert_eq!(0, fifo.occupancy());
    assert_eq!(StatusCounters::default(), fifo.counters());
}

#[test]
fn drop_flags_need_frame_mode() {
    let config = FifoConfig {
        drop_bad_frame: true,
        ..FifoConfig::default()
    };
    assert!(Fifo::new("fifo", Arc::new(config)).is_err());

    let unframed = FifoConfig {
        format: BeatFormat::default().with_last_enable(false),
        frame_fifo: true,
        ..FifoConfig::default()
    };
    assert!(Fifo::new("fifo", Arc::new(unframed)).is_err());
}
