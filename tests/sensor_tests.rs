//! Sensor engine tests against the in-memory mock transport

use netft::calibration::ZERO_OFFSET;
use netft::{NetFtError, Sensor, SensorConfig, SessionState};
use rdt_protocol::{Command, MockBoxHandle, MockTransport};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn mock_sensor() -> (Sensor<MockTransport>, MockBoxHandle) {
    init_logging();
    let (transport, handle) = MockTransport::pair();
    let mut config = SensorConfig::new("mock");
    config.settle_delay = Duration::from_millis(10);
    config.poll_interval = Duration::from_millis(5);
    (Sensor::new(transport, config), handle)
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_tare_computes_arithmetic_mean() {
    let (sensor, handle) = mock_sensor();
    for (i, fx) in [1_000_000, 2_000_000, 3_000_000, 4_000_000].iter().enumerate() {
        handle.push_counts(i as u32, [*fx, 10, -10, 0, 1, 2]);
    }

    let offset = sensor.tare(4).unwrap();
    assert_eq!(offset[0], 2_500_000.0);
    assert_eq!(offset[0] / 1_000_000.0, 2.5);
    assert_eq!(&offset[1..], &[10.0, -10.0, 0.0, 1.0, 2.0]);
    assert_eq!(sensor.offset(), offset);
    assert_eq!(handle.sent_commands(), vec![(Command::StartRealtime, 4)]);
    assert_eq!(sensor.session_state(), SessionState::Idle);
}

#[test]
fn test_sample_equal_to_mean_reads_zero_after_tare() {
    let (sensor, handle) = mock_sensor();
    let batch = [
        [1_000_000, -3, 7, 100, 0, -50],
        [3_000_000, -1, 9, 300, 0, -50],
        [5_000_000, -3, 7, 100, 0, -50],
        [7_000_000, -1, 9, 300, 0, -50],
    ];
    for (i, counts) in batch.iter().enumerate() {
        handle.push_counts(i as u32, *counts);
    }
    sensor.tare(batch.len()).unwrap();

    handle.push_counts(99, [4_000_000, -2, 8, 200, 0, -50]);
    let m = sensor.get_measurement().unwrap();
    assert_eq!(m.counts, [0.0; 6]);
    assert_eq!(m.force(), [0.0; 3]);
    assert_eq!(m.torque(), [0.0; 3]);
}

#[test]
fn test_zero_restores_untared_offset() {
    for n in 1..=5usize {
        let (sensor, handle) = mock_sensor();
        for i in 0..n {
            handle.push_counts(i as u32, [i as i32 * 17 + 3; 6]);
        }
        sensor.tare(n).unwrap();
        sensor.zero();
        assert_eq!(sensor.offset(), ZERO_OFFSET);
    }
}

#[test]
fn test_tare_rejects_zero_samples() {
    let (sensor, handle) = mock_sensor();
    assert!(matches!(sensor.tare(0), Err(NetFtError::InvalidArgument(_))));
    assert!(handle.sent_commands().is_empty());
}

#[test]
fn test_failed_tare_keeps_previous_offset() {
    let (sensor, handle) = mock_sensor();
    handle.push_counts(0, [5; 6]);
    sensor.tare(1).unwrap();

    // Malformed record mid-batch
    handle.push_counts(1, [100; 6]);
    handle.push_datagram(&[0u8; 12]);
    let result = sensor.tare(3);
    assert!(matches!(result, Err(NetFtError::MalformedResponse { .. })));
    assert_eq!(sensor.offset(), [5.0; 6]);
    assert_eq!(sensor.session_state(), SessionState::Idle);
    assert_eq!(handle.sent_commands().last(), Some(&(Command::Stop, 0)));

    // Transport failure mid-batch
    handle.push_counts(2, [100; 6]);
    handle.push_fault(io::ErrorKind::ConnectionRefused);
    let result = sensor.tare(2);
    assert!(matches!(result, Err(NetFtError::Transport(_))));
    assert_eq!(sensor.offset(), [5.0; 6]);
}

#[test]
fn test_bounded_batch_returns_to_idle_after_last_receive() {
    let (sensor, handle) = mock_sensor();
    sensor.get_measurements(3).unwrap();
    assert_eq!(sensor.session_state(), SessionState::Streaming);

    for i in 0..3 {
        handle.push_counts(i, [i as i32; 6]);
    }
    for i in 0..3 {
        let m = sensor.receive().unwrap();
        assert_eq!(m.sequence, i);
    }
    assert_eq!(sensor.session_state(), SessionState::Idle);
    assert_eq!(handle.sent_commands(), vec![(Command::StartRealtime, 3)]);
}

#[test]
fn test_infinite_request_then_stop_on_the_wire() {
    let (sensor, handle) = mock_sensor();
    sensor.get_measurements(0).unwrap();
    sensor.stop_streaming().unwrap();

    assert_eq!(
        handle.sent_commands(),
        vec![(Command::StartRealtime, 0), (Command::Stop, 0)]
    );
    let stop = &handle.sent_datagrams()[1];
    assert_eq!(stop.as_slice(), &[0x12, 0x34, 0, 0, 0, 0, 0, 0]);
    assert_eq!(sensor.session_state(), SessionState::Idle);
}

#[test]
fn test_manual_streaming_without_handler() {
    let (sensor, handle) = mock_sensor();
    sensor.start_streaming(false).unwrap();
    assert!(!sensor.is_handler_running());

    handle.push_counts(1, [2_000_000; 6]);
    let m = sensor.receive().unwrap();
    assert_eq!(m.force(), [2.0; 3]);
    assert_eq!(sensor.session_state(), SessionState::Streaming);

    sensor.stop_streaming().unwrap();
    assert_eq!(sensor.session_state(), SessionState::Idle);
}

#[test]
fn test_handler_streaming_publishes_and_stops_cleanly() {
    let (sensor, handle) = mock_sensor();
    sensor.start_streaming(true).unwrap();
    assert!(sensor.is_handler_running());
    assert_eq!(sensor.session_state(), SessionState::Streaming);
    assert_eq!(
        handle.sent_commands(),
        vec![(Command::StartRealtime, 0)]
    );

    for i in 1..=5 {
        handle.push_counts(i, [i as i32 * 1_000_000; 6]);
    }
    assert!(wait_until(|| sensor
        .last_published()
        .is_some_and(|m| m.sequence == 5)));

    let m = sensor.measurement().unwrap();
    assert_eq!(m.sequence, 5);
    assert_eq!(sensor.force().unwrap(), [5.0; 3]);
    assert_eq!(sensor.torque().unwrap(), [5.0; 3]);

    sensor.stop_streaming().unwrap();
    assert_eq!(sensor.session_state(), SessionState::Idle);
    assert!(!sensor.is_handler_running());
    assert_eq!(
        handle.sent_commands().last(),
        Some(&(Command::Stop, 0))
    );

    // Nothing consumes the socket any more
    let before = sensor.last_published();
    handle.push_counts(6, [42; 6]);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sensor.last_published(), before);
    assert!(matches!(
        sensor.measurement(),
        Err(NetFtError::InvalidState(_))
    ));
}

#[test]
fn test_manual_calls_rejected_while_handler_owns_socket() {
    let (sensor, _handle) = mock_sensor();
    sensor.start_streaming(true).unwrap();

    assert!(matches!(sensor.receive(), Err(NetFtError::InvalidState(_))));
    assert!(matches!(
        sensor.get_measurement(),
        Err(NetFtError::InvalidState(_))
    ));
    assert!(matches!(
        sensor.get_measurements(3),
        Err(NetFtError::InvalidState(_))
    ));
    assert!(matches!(sensor.tare(2), Err(NetFtError::InvalidState(_))));
    assert!(matches!(
        sensor.start_streaming(true),
        Err(NetFtError::InvalidState(_))
    ));
    // Handler is running but has nothing to show yet
    assert!(matches!(
        sensor.measurement(),
        Err(NetFtError::InvalidState(_))
    ));

    sensor.stop_streaming().unwrap();
}

#[test]
fn test_malformed_datagram_does_not_stop_handler() {
    let (sensor, handle) = mock_sensor();
    sensor.start_streaming(true).unwrap();

    handle.push_datagram(&[0xff; 8]);
    handle.push_counts(1, [1; 6]);
    assert!(wait_until(|| sensor.stream_stats().published == 1));
    assert_eq!(sensor.stream_stats().skipped, 1);
    assert!(sensor.is_handler_running());
    assert_eq!(sensor.measurement().unwrap().counts, [1.0; 6]);

    sensor.stop_streaming().unwrap();
}

#[test]
fn test_transport_failure_ends_handler() {
    let (sensor, handle) = mock_sensor();
    sensor.start_streaming(true).unwrap();
    handle.push_counts(1, [1; 6]);
    handle.push_fault(io::ErrorKind::ConnectionReset);

    assert!(wait_until(|| !sensor.is_handler_running()));
    assert_eq!(sensor.session_state(), SessionState::Idle);
    assert!(sensor.transport_fault().is_some());
    assert!(matches!(
        sensor.measurement(),
        Err(NetFtError::TransportLost(_))
    ));

    // A fresh start reaps the dead handler and clears the fault
    sensor.start_streaming(true).unwrap();
    assert!(sensor.transport_fault().is_none());
    sensor.stop_streaming().unwrap();
}

#[test]
fn test_handler_applies_tare_offset() {
    let (sensor, handle) = mock_sensor();
    handle.push_counts(0, [3_000_000, 0, 0, 0, 0, 0]);
    sensor.tare(1).unwrap();

    sensor.start_streaming(true).unwrap();
    handle.push_counts(1, [4_000_000, 0, 0, 0, 0, 0]);
    assert!(wait_until(|| sensor.last_published().is_some()));
    assert_eq!(sensor.force().unwrap(), [1.0, 0.0, 0.0]);

    // zero() takes effect on the next published sample
    sensor.zero();
    handle.push_counts(2, [4_000_000, 0, 0, 0, 0, 0]);
    assert!(wait_until(|| sensor
        .last_published()
        .is_some_and(|m| m.sequence == 2)));
    assert_eq!(sensor.force().unwrap(), [4.0, 0.0, 0.0]);

    sensor.stop_streaming().unwrap();
}

#[test]
fn test_concurrent_readers_never_see_torn_measurements() {
    let (sensor, handle) = mock_sensor();
    let sensor = Arc::new(sensor);
    sensor.start_streaming(true).unwrap();

    let writer = thread::spawn(move || {
        for k in 1..=2_000i32 {
            handle.push_counts(k as u32, [k, k, k, k, k, k]);
        }
        handle
    });

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sensor = sensor.clone();
            thread::spawn(move || {
                let mut observed = 0;
                let deadline = Instant::now() + Duration::from_secs(3);
                while Instant::now() < deadline {
                    match sensor.measurement() {
                        Ok(m) => {
                            let first = m.counts[0];
                            assert!(
                                m.counts.iter().all(|&c| c == first),
                                "torn measurement: {:?}",
                                m.counts
                            );
                            assert_eq!(first, f64::from(m.sequence as i32));
                            observed += 1;
                            if m.sequence == 2_000 {
                                break;
                            }
                        }
                        Err(NetFtError::InvalidState(_)) => thread::yield_now(),
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                observed
            })
        })
        .collect();

    let _handle = writer.join().unwrap();
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }

    sensor.stop_streaming().unwrap();
}

#[test]
fn test_stop_streaming_from_another_thread() {
    let (sensor, handle) = mock_sensor();
    let sensor = Arc::new(sensor);
    sensor.start_streaming(true).unwrap();

    let stopper = {
        let sensor = sensor.clone();
        thread::spawn(move || sensor.stop_streaming())
    };
    stopper.join().unwrap().unwrap();

    assert!(!sensor.is_handler_running());
    assert_eq!(sensor.session_state(), SessionState::Idle);
    assert_eq!(handle.sent_commands().last(), Some(&(Command::Stop, 0)));
}

#[test]
fn test_manual_calls_rejected_until_stop_streaming_returns() {
    init_logging();
    let (transport, handle) = MockTransport::pair();
    let mut config = SensorConfig::new("mock");
    config.settle_delay = Duration::from_millis(300);
    config.poll_interval = Duration::from_millis(50);
    let sensor = Arc::new(Sensor::new(transport, config));
    sensor.start_streaming(true).unwrap();

    let stopper = {
        let sensor = sensor.clone();
        thread::spawn(move || sensor.stop_streaming())
    };
    // The loop is halted but the sensor still holds the socket for STOP and drain
    assert!(wait_until(|| !sensor.is_handler_running()));
    assert!(matches!(
        sensor.get_measurements(1),
        Err(NetFtError::InvalidState(_))
    ));
    assert!(matches!(sensor.receive(), Err(NetFtError::InvalidState(_))));
    assert!(matches!(sensor.tare(1), Err(NetFtError::InvalidState(_))));

    stopper.join().unwrap().unwrap();
    assert_eq!(
        handle.sent_commands(),
        vec![(Command::StartRealtime, 0), (Command::Stop, 0)]
    );

    sensor.get_measurements(1).unwrap();
    handle.push_counts(7, [0; 6]);
    assert_eq!(sensor.receive().unwrap().sequence, 7);
    assert_eq!(sensor.session_state(), SessionState::Idle);
}

#[test]
fn test_samples_sent_before_stop_are_not_read_afterwards() {
    let (sensor, handle) = mock_sensor();
    sensor.start_streaming(false).unwrap();

    for sequence in 1..=20 {
        handle.push_counts(sequence, [sequence as i32; 6]);
    }
    assert_eq!(sensor.receive().unwrap().sequence, 1);

    sensor.stop_streaming().unwrap();
    assert_eq!(sensor.session_state(), SessionState::Idle);

    handle.push_counts(99, [99; 6]);
    let m = sensor.get_measurement().unwrap();
    assert_eq!(m.sequence, 99);
    assert_eq!(m.counts, [99.0; 6]);
}

#[test]
fn test_single_read_during_manual_stream_ends_the_stream() {
    let (sensor, handle) = mock_sensor();
    sensor.start_streaming(false).unwrap();
    assert_eq!(sensor.session_state(), SessionState::Streaming);

    handle.push_counts(1, [0; 6]);
    sensor.get_measurement().unwrap();

    assert_eq!(sensor.session_state(), SessionState::Idle);
    assert_eq!(
        handle.sent_commands(),
        vec![(Command::StartRealtime, 0), (Command::StartRealtime, 1)]
    );
}
