// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Message framing and connection authentication.
//!
//! A frame is a 4-byte little-endian length followed by a JSON body. Both
//! ends prove knowledge of the shared authkey before any command flows:
//! each side sends a random challenge and expects `SHA-256(authkey || challenge)`
//! back.

use crate::error::{BridgeError, BridgeResult};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
pub const CHALLENGE_LEN: usize = 32;

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> BridgeResult<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(BridgeError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R) -> BridgeResult<Vec<u8>> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(BridgeError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn send_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> BridgeResult<()> {
    let body = serde_json::to_vec(message)?;
    write_frame(writer, &body)
}

pub fn recv_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> BridgeResult<T> {
    let body = read_frame(reader)?;
    Ok(serde_json::from_slice(&body)?)
}

fn digest(authkey: &[u8], challenge: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(authkey);
    hasher.update(challenge);
    hasher.finalize().to_vec()
}

fn challenge_peer<S: Read + Write>(stream: &mut S, authkey: &[u8]) -> BridgeResult<()> {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::thread_rng().fill_bytes(&mut challenge);
    write_frame(stream, &challenge)?;
    let answer = read_frame(stream)?;
    let ok = answer == digest(authkey, &challenge);
    write_frame(stream, &[ok as u8])?;
    if ok {
        Ok(())
    } else {
        Err(BridgeError::AuthenticationFailed)
    }
}

fn answer_peer<S: Read + Write>(stream: &mut S, authkey: &[u8]) -> BridgeResult<()> {
    let challenge = read_frame(stream)?;
    if challenge.len() != CHALLENGE_LEN {
        return Err(BridgeError::AuthenticationFailed);
    }
    write_frame(stream, &digest(authkey, &challenge))?;
    match read_frame(stream)?.as_slice() {
        [1] => Ok(()),
        _ => Err(BridgeError::AuthenticationFailed),
    }
}

/// Server half of the mutual handshake: challenge first, then answer.
pub fn accept_handshake<S: Read + Write>(stream: &mut S, authkey: &[u8]) -> BridgeResult<()> {
    challenge_peer(stream, authkey)?;
    answer_peer(stream, authkey)
}

/// Client half of the mutual handshake: answer first, then challenge.
pub fn connect_handshake<S: Read + Write>(stream: &mut S, authkey: &[u8]) -> BridgeResult<()> {
    answer_peer(stream, authkey)?;
    challenge_peer(stream, authkey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn test_frame_round_trip_through_buffer() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        assert_eq!(&buf[..4], &5u32.to_le_bytes());
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"hello");
    }

    #[test]
    fn test_oversized_frame_header_rejected() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
        let mut cursor = Cursor::new(header.to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(BridgeError::FrameTooLarge(_))
        ));
    }

    fn handshake_pair(server_key: &'static [u8], client_key: &'static [u8]) -> (bool, bool) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            accept_handshake(&mut stream, server_key).is_ok()
        });
        let mut stream = TcpStream::connect(addr).unwrap();
        let client_ok = connect_handshake(&mut stream, client_key).is_ok();
        (server.join().unwrap(), client_ok)
    }

    #[test]
    fn test_handshake_with_matching_keys() {
        assert_eq!(handshake_pair(b"vsi_audio", b"vsi_audio"), (true, true));
    }

    #[test]
    fn test_handshake_with_wrong_key_fails_both_sides() {
        let (server_ok, client_ok) = handshake_pair(b"vsi_audio", b"intruder");
        assert!(!server_ok);
        assert!(!client_ok);
    }
}
