use std::io::Write;
use std::sync::{Arc, Mutex};

pub(super) fn resp_command(parts: &[&[u8]]) -> Vec<u8> {
    let mut payload = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        payload.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        payload.extend_from_slice(part);
        payload.extend_from_slice(b"\r\n");
    }
    payload
}

pub(super) fn decode_resp_bulk_payload(frame: &[u8]) -> String {
    assert_eq!(frame.first(), Some(&b'$'));

    let Some(header_end) = frame.windows(2).position(|window| window == b"\r\n") else {
        panic!("RESP bulk string must contain a header terminator");
    };
    let header = std::str::from_utf8(&frame[1..header_end]).expect("header must be UTF-8");
    let payload_len = header
        .parse::<usize>()
        .expect("header must encode bulk payload length");

    let payload_start = header_end + 2;
    let payload_end = payload_start + payload_len;
    std::str::from_utf8(&frame[payload_start..payload_end])
        .expect("payload must be UTF-8")
        .to_owned()
}

pub(super) fn parse_resp_integer(frame: &[u8]) -> i64 {
    assert_eq!(frame.first(), Some(&b':'));
    assert!(frame.ends_with(b"\r\n"));

    let number = std::str::from_utf8(&frame[1..frame.len() - 2])
        .expect("RESP integer payload must be UTF-8");
    number
        .parse::<i64>()
        .expect("RESP integer payload must parse")
}

/// Cloneable in-memory write half standing in for a replica socket.
#[derive(Debug, Clone, Default)]
pub(super) struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub(super) fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
