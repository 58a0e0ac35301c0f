use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

fn device_with(rx: LineEnding, tx: LineEnding, capacity: usize) -> (LineDisciplineDevice, ByteChannel, ByteChannel) {
    let inbound = ByteChannel::new(capacity).unwrap();
    let outbound = ByteChannel::new(capacity).unwrap();
    let device = LineDisciplineDevice::new(inbound.clone(), outbound.clone(), LineEndings { rx, tx });
    device.register(None).unwrap();
    (device, inbound, outbound)
}

fn drain(channel: &ByteChannel) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = channel.receive(Wait::Poll) {
        out.extend_from_slice(&chunk);
    }
    out
}

fn read_until_would_block(device: &LineDisciplineDevice, buf_len: usize) -> Vec<u8> {
    let handle = device.open(OpenFlags::nonblocking());
    let mut out = Vec::new();
    let mut buf = vec![0u8; buf_len];
    loop {
        match device.read(handle, &mut buf) {
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(DeviceError::WouldBlock) => return out,
            Err(e) => panic!("unexpected read error: {e}"),
        }
    }
}

/// CRLF decode where a trailing lone CR stays undecided
fn reference_crlf_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < input.len() {
        match (input[i], input.get(i + 1)) {
            (CR, Some(&LF)) => {
                out.push(LF);
                i += 2;
            }
            (CR, None) => break,
            (byte, _) => {
                out.push(byte);
                i += 1;
            }
        }
    }
    out
}

#[test]
fn test_passthrough_without_newlines() {
    let (device, inbound, outbound) = device_with(LineEnding::Lf, LineEnding::Lf, 1024);
    let handle = device.open(OpenFlags::blocking());
    let mut rng = StdRng::seed_from_u64(7);
    let payload: Vec<u8> = (0..500)
        .map(|_| rng.gen::<u8>())
        .filter(|b| *b != CR && *b != LF)
        .collect();

    assert_eq!(device.write(handle, &payload).unwrap(), payload.len());
    let wire = drain(&outbound);
    assert_eq!(wire, payload);

    inbound.send(&wire, Wait::Poll).unwrap();
    assert_eq!(read_until_would_block(&device, 64), payload);
}

#[test]
fn test_tx_crlf_expands_newline() {
    let (device, _inbound, outbound) = device_with(LineEnding::Lf, LineEnding::CrLf, 64);
    let handle = device.open(OpenFlags::blocking());

    assert_eq!(device.write(handle, b"a\nb").unwrap(), 3);
    assert_eq!(drain(&outbound), vec![b'a', CR, LF, b'b']);
}

#[test]
fn test_tx_cr_and_lf_modes() {
    let (device, _inbound, outbound) = device_with(LineEnding::Lf, LineEnding::Cr, 64);
    let handle = device.open(OpenFlags::blocking());

    device.write(handle, b"a\nb").unwrap();
    assert_eq!(drain(&outbound), b"a\rb");

    device.set_tx_mode(LineEnding::Lf);
    device.write(handle, b"a\nb\n").unwrap();
    assert_eq!(drain(&outbound), b"a\nb\n");
}

#[test]
fn test_rx_crlf_collapses_pair() {
    let (device, inbound, _outbound) = device_with(LineEnding::CrLf, LineEnding::Lf, 64);
    inbound.send(b"ping\r\n", Wait::Poll).unwrap();

    assert_eq!(read_until_would_block(&device, 16), b"ping\n");
}

#[test]
fn test_rx_crlf_lone_cr_uses_pushback_across_reads() {
    let (device, inbound, _outbound) = device_with(LineEnding::CrLf, LineEnding::Lf, 64);
    let handle = device.open(OpenFlags::nonblocking());
    inbound.send(b"\rx", Wait::Poll).unwrap();

    let mut buf = [0u8; 1];
    assert_eq!(device.read(handle, &mut buf), Ok(1));
    assert_eq!(buf[0], CR);
    assert_eq!(device.read(handle, &mut buf), Ok(1));
    assert_eq!(buf[0], b'x');
    assert_eq!(device.read(handle, &mut buf), Err(DeviceError::WouldBlock));
}

#[test]
fn test_rx_crlf_holds_trailing_cr_until_next_byte() {
    let (device, inbound, _outbound) = device_with(LineEnding::CrLf, LineEnding::Lf, 64);
    let handle = device.open(OpenFlags::nonblocking());
    let mut buf = [0u8; 8];

    inbound.send(b"ab\r", Wait::Poll).unwrap();
    assert_eq!(device.read(handle, &mut buf), Ok(2));
    assert_eq!(&buf[..2], b"ab");
    assert_eq!(device.read(handle, &mut buf), Err(DeviceError::WouldBlock));

    inbound.send(b"\n", Wait::Poll).unwrap();
    assert_eq!(device.read(handle, &mut buf), Ok(1));
    assert_eq!(buf[0], LF);
}

#[test]
fn test_rx_crlf_double_cr() {
    let (device, inbound, _outbound) = device_with(LineEnding::CrLf, LineEnding::Lf, 64);
    inbound.send(b"\r\r\n", Wait::Poll).unwrap();

    assert_eq!(read_until_would_block(&device, 8), b"\r\n");
}

#[test]
fn test_rx_cr_mode() {
    let (device, inbound, _outbound) = device_with(LineEnding::Cr, LineEnding::Lf, 64);
    inbound.send(b"a\rb\n", Wait::Poll).unwrap();

    assert_eq!(read_until_would_block(&device, 8), b"a\nb\n");
}

#[test]
fn test_randomized_crlf_decode_matches_reference() {
    let mut rng = StdRng::seed_from_u64(0xc0ffee);
    let alphabet = [b'a', b'b', CR, LF];

    for _ in 0..500 {
        let (device, inbound, _outbound) = device_with(LineEnding::CrLf, LineEnding::Lf, 512);
        let len = rng.gen_range(0..=256);
        let mut input: Vec<u8> = (0..len).map(|_| alphabet[rng.gen_range(0..alphabet.len())]).collect();
        if rng.gen_bool(0.25) {
            input.push(CR);
        }

        let mut decoded = Vec::new();
        let mut fed = 0;
        while fed < input.len() {
            let step = rng.gen_range(1..=8).min(input.len() - fed);
            inbound.send(&input[fed..fed + step], Wait::Poll).unwrap();
            fed += step;
            decoded.extend(read_until_would_block(&device, rng.gen_range(1..=8)));
        }

        assert_eq!(decoded, reference_crlf_decode(&input), "input: {input:?}");

        // A held CR is released by whatever comes next
        if input.last() == Some(&CR) {
            inbound.send(b"z", Wait::Poll).unwrap();
            assert_eq!(read_until_would_block(&device, 4), b"\rz");
        }
    }
}

#[test]
fn test_nonblocking_read_on_empty_channel() {
    let (device, _inbound, _outbound) = device_with(LineEnding::CrLf, LineEnding::CrLf, 64);
    let handle = device.open(OpenFlags::nonblocking());
    let mut buf = [0u8; 16];

    let started = Instant::now();
    assert_eq!(device.read(handle, &mut buf), Err(DeviceError::WouldBlock));
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_blocking_read_waits_for_input() {
    let (device, inbound, _outbound) = device_with(LineEnding::Lf, LineEnding::Lf, 64);
    let handle = device.open(OpenFlags::blocking());

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        inbound.send(b"late", Wait::Forever).unwrap();
    });

    let mut buf = [0u8; 16];
    let n = device.read(handle, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"late");
    producer.join().unwrap();
}

#[test]
fn test_nonblocking_short_write() {
    let (device, _inbound, outbound) = device_with(LineEnding::Lf, LineEnding::CrLf, 4);
    let handle = device.open(OpenFlags::nonblocking());

    assert_eq!(device.write(handle, b"abcdefgh").unwrap(), 4);
    assert_eq!(drain(&outbound), b"abcd");

    // The translated newline needs two bytes; only one is free
    outbound.send(b"xyz", Wait::Poll).unwrap();
    assert_eq!(device.write(handle, b"\nq").unwrap(), 0);
    assert_eq!(drain(&outbound), b"xyz");

    assert_eq!(device.write(handle, b"q\n").unwrap(), 2);
    assert_eq!(drain(&outbound), b"q\r\n");
}

#[test]
fn test_flush_waits_for_drainer() {
    let (device, _inbound, outbound) = device_with(LineEnding::Lf, LineEnding::Lf, 64);
    let handle = device.open(OpenFlags::blocking());
    let payload: Vec<u8> = (0..32u8).map(|i| b'a' + i % 26).collect();
    device.write(handle, &payload).unwrap();

    let drainer = {
        let outbound = outbound.clone();
        thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < 32 {
                if let Some(chunk) = outbound.receive_upto(4, Wait::For(Duration::from_millis(10))) {
                    thread::sleep(Duration::from_millis(5));
                    seen.extend_from_slice(&chunk);
                }
            }
            seen
        })
    };

    device.flush(handle).unwrap();
    assert_eq!(outbound.pending_bytes(), 0);
    assert_eq!(drainer.join().unwrap(), payload);
}

#[test]
fn test_bad_handle_rejected() {
    let (device, _inbound, _outbound) = device_with(LineEnding::Lf, LineEnding::Lf, 64);
    let bogus = Handle::from_raw(3);
    let mut buf = [0u8; 4];

    assert_eq!(device.read(bogus, &mut buf), Err(DeviceError::BadHandle(bogus)));
    assert_eq!(device.write(bogus, b"x"), Err(DeviceError::BadHandle(bogus)));
    assert_eq!(device.close(bogus), Err(DeviceError::BadHandle(bogus)));
}

#[test]
fn test_flags_and_stat() {
    let (device, _inbound, _outbound) = device_with(LineEnding::Lf, LineEnding::Lf, 64);
    let handle = device.open(OpenFlags::blocking());

    assert_eq!(device.flags(handle), Ok(OpenFlags::blocking()));
    device.set_flags(handle, OpenFlags::nonblocking()).unwrap();
    assert_eq!(device.flags(handle), Ok(OpenFlags::nonblocking()));
    assert_eq!(device.stat(handle).unwrap().kind, DeviceKind::Character);
}

#[test]
fn test_registration_lifecycle() {
    let (device, _inbound, _outbound) = device_with(LineEnding::Cr, LineEnding::CrLf, 64);
    assert_eq!(device.path().as_deref(), Some(DEFAULT_PATH));
    assert_eq!(
        device.register(Some("/dev/other")),
        Err(DeviceError::AlreadyRegistered(DEFAULT_PATH.to_string()))
    );
    assert!(matches!(
        device.unregister(Some("/dev/other")),
        Err(DeviceError::PathMismatch { .. })
    ));

    device.set_rx_mode(LineEnding::Lf);
    device.open(OpenFlags::nonblocking());
    device.unregister(None).unwrap();
    assert!(!device.is_registered());
    assert_eq!(device.unregister(None), Err(DeviceError::NotRegistered));

    device.register(Some("/dev/con1")).unwrap();
    assert_eq!(device.rx_mode(), LineEnding::Cr);
    assert_eq!(device.flags(Handle::DEVICE), Ok(OpenFlags::blocking()));
}

#[test]
fn test_register_path_too_long() {
    let channel = ByteChannel::new(8).unwrap();
    let device = LineDisciplineDevice::new(channel.clone(), channel, LineEndings::default());
    assert_eq!(
        device.register(Some("/dev/a-very-long-name")),
        Err(DeviceError::PathTooLong { len: 21, max: MAX_PATH_LEN })
    );
}

#[test]
#[should_panic(expected = "unregistered")]
fn test_use_while_unregistered_is_fatal() {
    let channel = ByteChannel::new(8).unwrap();
    let device = LineDisciplineDevice::new(channel.clone(), channel, LineEndings::default());
    let _ = device.write(Handle::DEVICE, b"x");
}

#[test]
#[should_panic(expected = "pushback slot already holds a byte")]
fn test_double_pushback_is_fatal() {
    let mut state = ReadState::new(LineEnding::CrLf);
    state.push_back(b'a');
    state.push_back(b'b');
}

#[test]
fn test_discard_pending_input() {
    let (device, inbound, _outbound) = device_with(LineEnding::CrLf, LineEnding::Lf, 64);
    inbound.send(b"stale\r", Wait::Poll).unwrap();
    assert_eq!(read_until_would_block(&device, 16), b"stale");

    inbound.send(b"more", Wait::Poll).unwrap();
    assert_eq!(device.discard_pending_input(), 5);
    assert_eq!(inbound.pending_bytes(), 0);
    assert!(read_until_would_block(&device, 16).is_empty());
}

#[test]
fn test_try_write_skips_when_full() {
    let (device, _inbound, outbound) = device_with(LineEnding::Lf, LineEnding::Lf, 4);
    assert_eq!(device.try_write(b"abcdef"), 4);
    assert_eq!(device.try_write(b"g"), 0);
    assert_eq!(drain(&outbound), b"abcd");
}
