use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use greenlight::error::ChannelError;
use greenlight::phase::{ChannelMode, PhaseChannel};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A FIFO channel with room for everything delivers every value once,
    /// in send order.
    #[test]
    fn fifo_preserves_order(values in proptest::collection::vec(any::<u32>(), 1..64)) {
        let channel = PhaseChannel::new(ChannelMode::Fifo { capacity: values.len() });
        for v in &values {
            prop_assert!(channel.send(*v));
        }
        let received: Vec<u32> = std::iter::from_fn(|| channel.try_receive()).collect();
        prop_assert_eq!(received, values);
    }

    /// An undersized FIFO keeps the newest `capacity` values.
    #[test]
    fn fifo_drops_oldest(values in proptest::collection::vec(any::<u32>(), 1..64), capacity in 1usize..16) {
        let channel = PhaseChannel::new(ChannelMode::Fifo { capacity });
        for v in &values {
            channel.send(*v);
        }
        let received: Vec<u32> = std::iter::from_fn(|| channel.try_receive()).collect();
        let keep = values.len().min(capacity);
        prop_assert_eq!(&received[..], &values[values.len() - keep..]);
        prop_assert_eq!(channel.stats().overwritten, (values.len() - keep) as u64);
    }

    /// A latest-value channel only ever hands out the most recent send.
    #[test]
    fn latest_returns_last_sent(values in proptest::collection::vec(any::<u32>(), 1..64)) {
        let channel = PhaseChannel::new(ChannelMode::Latest);
        for v in &values {
            channel.send(*v);
        }
        prop_assert_eq!(channel.try_receive(), values.last().copied());
        prop_assert_eq!(channel.try_receive(), None);
    }
}

#[test]
fn concurrent_receivers_never_see_unsent_or_duplicate_values() {
    const SENT: u32 = 500;
    let channel = Arc::new(PhaseChannel::new(ChannelMode::Fifo {
        capacity: SENT as usize,
    }));

    let receivers: Vec<_> = (0..4)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let mut got = Vec::new();
                while let Ok(v) = channel.receive() {
                    got.push(v);
                }
                got
            })
        })
        .collect();

    for v in 0..SENT {
        channel.send(v);
    }
    channel.close();

    let mut seen = HashSet::new();
    for receiver in receivers {
        let got = receiver.join().unwrap();
        assert!(got.windows(2).all(|w| w[0] < w[1]), "out of order: {got:?}");
        for v in got {
            assert!(v < SENT, "received unsent value {v}");
            assert!(seen.insert(v), "duplicate delivery of {v}");
        }
    }
    assert_eq!(seen.len(), SENT as usize);
}

#[test]
fn blocked_receiver_sleeps_until_send() {
    let channel = Arc::new(PhaseChannel::<u8>::new(ChannelMode::Latest));
    let receiver = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || channel.receive())
    };

    thread::sleep(Duration::from_millis(100));
    channel.send(1);
    assert_eq!(receiver.join().unwrap(), Ok(1));
    // One wakeup for the send, possibly one spurious; never a polling loop.
    assert!(channel.stats().wakeups <= 2, "{:?}", channel.stats());
}

#[test]
fn receive_after_close_drains_then_fails() {
    let channel = PhaseChannel::new(ChannelMode::Fifo { capacity: 4 });
    channel.send('a');
    channel.close();
    assert!(!channel.send('b'));
    assert_eq!(channel.receive(), Ok('a'));
    assert_eq!(channel.receive(), Err(ChannelError::Closed));
}
