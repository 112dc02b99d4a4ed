use std::sync::Arc;

use super::{run, words};
use crate::axis::rate_limit::{RateLimitConfig, RateLimiter};
use crate::base::port::link;
use crate::sim::driver::{make_frame, StreamSink, StreamSource};

fn bench(config: RateLimitConfig) -> (Vec<StreamSource>, RateLimiter, Vec<StreamSink>) {
    let mut rl = RateLimiter::new("rate_limit", Arc::new(config)).unwrap();
    let mut src = vec![StreamSource::new(0)];
    link(&mut src[0].m_axis, &mut rl.s_axis);
    let mut sinks = vec![StreamSink::always()];
    link(&mut rl.m_axis, &mut sinks[0].s_axis);
    (src, rl, sinks)
}

fn arrivals(sink: &StreamSink) -> Vec<u64> {
    sink.received().iter().map(|(c, _)| *c).collect()
}

#[test]
fn quarter_rate_spaces_beats() {
    let (mut src, mut rl, mut sinks) = bench(RateLimitConfig {
        rate_num: 1,
        rate_denom: 4,
        ..RateLimitConfig::default()
    });
    let data = (0..40).collect::<Vec<u64>>();
    src[0].push_frame(make_frame(&data, 4, 0, 0, 0));

    run(&mut src, &mut [&mut rl], &mut sinks, 400);

    assert_eq!(data, words(&sinks[0].beats()));
    let cycles = arrivals(&sinks[0]);
    let span = cycles[39] - cycles[0];
    assert!((4 * 38..=4 * 39).contains(&span), "span {}", span);
}

#[test]
fn full_rate_is_unthrottled() {
    let (mut src, mut rl, mut sinks) = bench(RateLimitConfig::default());
    src[0].push_frame(make_frame(&(0..16).collect::<Vec<u64>>(), 4, 0, 0, 0));

    run(&mut src, &mut [&mut rl], &mut sinks, 40);

    let cycles = arrivals(&sinks[0]);
    assert_eq!(16, cycles.len());
    assert!(cycles.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn frame_mode_only_pauses_between_frames() {
    let (mut src, mut rl, mut sinks) = bench(RateLimitConfig {
        rate_num: 1,
        rate_denom: 2,
        rate_by_frame: true,
        ..RateLimitConfig::default()
    });
    for f in 0..4u64 {
        src[0].push_frame(make_frame(&[f * 10, f * 10 + 1, f * 10 + 2, f * 10 + 3], 4, 0, 0, 0));
    }

    run(&mut src, &mut [&mut rl], &mut sinks, 100);

    let received = sinks[0].received();
    assert_eq!(16, received.len());
    for frame in received.chunks(4) {
        assert!(frame.windows(2).all(|w| w[1].0 == w[0].0 + 1));
    }
    // frames as a whole still average the configured rate
    let span = received[15].0 - received[0].0;
    assert!(span >= 24, "span {}", span);
}

#[test]
fn rate_changes_are_validated() {
    let (_, mut rl, _) = bench(RateLimitConfig::default());
    assert!(rl.set_rate(0, 4).is_err());
    assert!(rl.set_rate(5, 4).is_err());
    rl.set_rate(3, 8).unwrap();
    assert_eq!((3, 8), rl.rate());
    assert!(RateLimiter::new(
        "rate_limit",
        Arc::new(RateLimitConfig {
            rate_denom: 0,
            ..RateLimitConfig::default()
        })
    )
    .is_err());
}
