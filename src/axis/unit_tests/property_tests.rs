use std::sync::Arc;

use proptest::prelude::*;

use super::{run, run_crossing, words};
use crate::axis::address_map::AddressMap;
use crate::axis::arbiter::{ArbPolicy, Arbiter, ArbiterConfig};
use crate::axis::async_fifo::async_fifo;
use crate::axis::fifo::{Fifo, FifoConfig};
use crate::axis::switch::{Switch, SwitchConfig};
use crate::base::beat::BeatFormat;
use crate::base::port::link;
use crate::sim::clock::ClockScheduler;
use crate::sim::driver::{make_frame, ReadyPattern, StreamSink, StreamSource};

/// Frames of the given lengths with consecutive payloads starting at `first`.
fn frames(lens: &[usize], first: u64) -> Vec<Vec<u64>> {
    let mut next = first;
    lens.iter()
        .map(|&len| {
            let frame = (next..next + len as u64).collect::<Vec<_>>();
            next += len as u64;
            frame
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fifo_delivers_every_beat_once_in_order(
        depth in 1usize..12,
        lens in prop::collection::vec(1usize..6, 1..12),
        idle in 0.0f64..0.7,
        ready in 0.2f64..1.0,
        seed in any::<u64>(),
    ) {
        let config = FifoConfig { depth, ..FifoConfig::default() };
        let mut fifo = Fifo::new("fifo", Arc::new(config)).unwrap();
        let mut src = vec![StreamSource::new(seed).with_idle(idle)];
        let mut sink = vec![StreamSink::new(ReadyPattern::Random(ready), seed ^ 0x5a5a)];
        link(&mut src[0].m_axis, &mut fifo.s_axis);
        link(&mut fifo.m_axis, &mut sink[0].s_axis);
        let sent = frames(&lens, 0);
        for frame in &sent {
            src[0].push_frame(make_frame(frame, 4, 0, 0, 0));
        }

        run(&mut src, &mut [&mut fifo], &mut sink, 3000);

        let expected = sent.concat();
        prop_assert_eq!(expected, words(&sink[0].beats()));
        prop_assert_eq!(lens.len(), sink[0].frames().len());
        prop_assert!(sink[0].violations().is_empty());
    }

    #[test]
    fn round_robin_serves_a_steady_requester_within_n_grants(
        ports in 2usize..8,
        requests in prop::collection::vec(prop::collection::vec(any::<bool>(), 8), 1..64),
        lsb_high_priority in any::<bool>(),
    ) {
        let config = ArbiterConfig {
            policy: ArbPolicy::RoundRobin,
            lsb_high_priority,
            block: false,
            block_ack: false,
        };
        let mut arb = Arbiter::new(ports, config);
        let steady = ports / 2;
        let mut since = 0;
        for row in &requests {
            let mut request = row[..ports].to_vec();
            request[steady] = true;
            let grant = arb.arbitrate(&request, &vec![false; ports]);
            prop_assert!(grant.is_some());
            if grant == Some(steady) {
                since = 0;
            } else {
                since += 1;
            }
            prop_assert!(since < ports, "port {} starved for {} grants", steady, since);
        }
    }

    #[test]
    fn async_fifo_survives_any_clock_ratio(
        wr_period in 1u64..10,
        rd_period in 1u64..10,
        rd_phase in 0u64..10,
        depth in 2usize..9,
        lens in prop::collection::vec(1usize..5, 1..10),
        ready in 0.3f64..1.0,
        seed in any::<u64>(),
    ) {
        let config = FifoConfig { depth, ..FifoConfig::default() };
        let (mut writer, mut reader) = async_fifo("afifo", Arc::new(config)).unwrap();
        let mut source = StreamSource::new(seed).with_idle(0.2);
        let mut sink = StreamSink::new(ReadyPattern::Random(ready), seed.wrapping_add(1));
        link(&mut source.m_axis, &mut writer.s_axis);
        link(&mut reader.m_axis, &mut sink.s_axis);
        let sent = frames(&lens, 7);
        for frame in &sent {
            source.push_frame(make_frame(frame, 4, 0, 0, 0));
        }

        let mut sched = ClockScheduler::new();
        let wr = sched.add_domain("wr", wr_period * 100, 0).unwrap();
        let rd = sched.add_domain("rd", rd_period * 100, rd_phase * 10).unwrap();
        run_crossing(&mut sched, (wr, rd), &mut source, &mut writer, &mut reader, &mut sink, 6000);

        prop_assert_eq!(sent.concat(), words(&sink.beats()));
        prop_assert!(sink.violations().is_empty());
    }

    #[test]
    fn switch_routes_each_frame_to_its_range(
        dests in prop::collection::vec(prop::collection::vec(0u64..32, 1..6), 3),
        ready in 0.3f64..1.0,
        seed in any::<u64>(),
    ) {
        let config = SwitchConfig {
            s_count: 3,
            m_count: 2,
            format: BeatFormat::default().with_dest_width(5).with_id_width(2),
            address_map: Some(AddressMap::from_bounds(&[0, 16], &[15, 31]).unwrap()),
            ..SwitchConfig::default()
        };
        let mut switch = Switch::new("switch", Arc::new(config)).unwrap();
        let mut src = (0..3).map(|i| StreamSource::new(seed.wrapping_add(i))).collect::<Vec<_>>();
        for (s, port) in src.iter_mut().zip(switch.s_axis.iter_mut()) {
            link(&mut s.m_axis, port);
        }
        let mut sinks = (0..2)
            .map(|i| StreamSink::new(ReadyPattern::Random(ready), seed ^ (i + 1)))
            .collect::<Vec<_>>();
        for (port, sink) in switch.m_axis.iter_mut().zip(sinks.iter_mut()) {
            link(port, &mut sink.s_axis);
        }
        for (i, (s, ds)) in src.iter_mut().zip(&dests).enumerate() {
            for (f, &dest) in ds.iter().enumerate() {
                let tag = (i * 100 + f * 10) as u64;
                s.push_frame(make_frame(&[tag, tag + 1], 4, i as u64, dest, 0));
            }
        }

        run(&mut src, &mut [&mut switch], &mut sinks, 1500);

        let total = dests.iter().map(Vec::len).sum::<usize>();
        prop_assert_eq!(total, sinks[0].frames().len() + sinks[1].frames().len());
        for (m, sink) in sinks.iter().enumerate() {
            for frame in sink.frames() {
                prop_assert_eq!(m, (frame[0].dest >= 16) as usize);
                prop_assert_eq!(frame[0].word() + 1, frame[1].word());
            }
            // frames from one input keep their order at each output
            for s in 0..3u64 {
                let tags = sink
                    .frames()
                    .iter()
                    .filter(|f| f[0].id == s)
                    .map(|f| f[0].word())
                    .collect::<Vec<_>>();
                prop_assert!(tags.windows(2).all(|w| w[0] < w[1]));
            }
            prop_assert!(sink.violations().is_empty());
        }
    }
}
