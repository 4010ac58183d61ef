// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Result;
use labwired_bridge::{
    AudioBackend, AudioFormat, BridgeClient, BridgeServer, ConnectionState, LocalChannel,
    StreamFormat, StreamMode, StreamTarget, SyntheticAudioHost, DEVICE_DEFAULT,
};
use labwired_config::BridgeConfig;
use proptest::prelude::*;
use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};

fn bridge_config(address: String, authkey: &str, attempts: u32, delay_ms: u64) -> BridgeConfig {
    BridgeConfig {
        address,
        authkey: authkey.to_string(),
        connect_attempts: attempts,
        retry_delay_ms: delay_ms,
    }
}

fn mono16() -> StreamFormat {
    StreamFormat::Audio(AudioFormat {
        channels: 1,
        sample_rate: 8000,
        sample_bits: 16,
    })
}

fn write_wav(path: &Path, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for s in samples {
        writer.write_sample(*s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_retry_budget_against_silent_listener() {
    // Accepts at the kernel level but never answers the handshake.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let config = bridge_config(addr, "vsi_audio", 3, 20);

    let start = Instant::now();
    let client = BridgeClient::connect(&config);
    let elapsed = start.elapsed();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.attempts(), 3);
    // Three bounded attempts plus two sleeps between them.
    assert!(elapsed >= Duration::from_millis(40), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3 * 20 + 2 * 20 + 500), "{:?}", elapsed);
    drop(listener);
}

#[test]
fn test_tcp_session_reads_wav_until_eos() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let samples: Vec<i16> = (0..10).map(|i| i * 100 - 300).collect();
    write_wav(&dir.path().join("in.wav"), &samples)?;

    let server = BridgeServer::bind(
        "127.0.0.1:0",
        "vsi_audio",
        AudioBackend::new(SyntheticAudioHost),
    )?;
    let addr = server.local_addr()?.to_string();
    let handle = std::thread::spawn(move || server.run());

    let mut client = BridgeClient::connect(&bridge_config(addr, "vsi_audio", 5, 1000));
    assert!(client.is_connected());
    assert!(client.set_mode(StreamMode::Input));
    assert!(client.set_filename(dir.path(), "in.wav"));
    assert!(client.configure(mono16()));
    assert!(client.enable());

    let (first, eos) = client.read(8);
    assert!(!eos);
    let expected: Vec<u8> = samples[..4].iter().flat_map(|s| s.to_le_bytes()).collect();
    assert_eq!(first, expected);

    let (rest, eos) = client.read(16);
    assert!(!eos);
    assert_eq!(rest.len(), 16);
    assert_eq!(&rest[12..], &[0, 0, 0, 0]);

    let (tail, eos) = client.read(16);
    assert!(eos);
    assert_eq!(tail.len(), 16);

    client.close();
    assert_eq!(client.state(), ConnectionState::Closed);
    handle.join().unwrap()?;
    Ok(())
}

#[test]
fn test_wrong_authkey_never_connects() -> Result<()> {
    let server = BridgeServer::bind(
        "127.0.0.1:0",
        "vsi_audio",
        AudioBackend::new(SyntheticAudioHost),
    )?;
    let addr = server.local_addr()?.to_string();
    let handle = std::thread::spawn(move || server.run());

    let client = BridgeClient::connect(&bridge_config(addr, "intruder", 1, 200));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(handle.join().unwrap().is_err());
    Ok(())
}

#[test]
fn test_dropped_client_closes_server() -> Result<()> {
    let server = BridgeServer::bind(
        "127.0.0.1:0",
        "vsi_audio",
        AudioBackend::new(SyntheticAudioHost),
    )?;
    let addr = server.local_addr()?.to_string();
    let handle = std::thread::spawn(move || server.run());

    {
        let mut client = BridgeClient::connect(&bridge_config(addr, "vsi_audio", 5, 1000));
        assert!(client.set_mode(StreamMode::Input));
        // Dropping the client sends CLOSE.
    }
    handle.join().unwrap()?;
    Ok(())
}

#[test]
fn test_server_survives_abrupt_disconnect() -> Result<()> {
    let server = BridgeServer::bind(
        "127.0.0.1:0",
        "vsi_video",
        AudioBackend::new(SyntheticAudioHost),
    )?;
    let addr = server.local_addr()?;
    let handle = std::thread::spawn(move || server.run());

    let mut stream = std::net::TcpStream::connect(addr)?;
    labwired_bridge::framing::connect_handshake(&mut stream, b"vsi_video")?;
    drop(stream);
    handle.join().unwrap()?;
    Ok(())
}

#[test]
fn test_failed_filename_resets_target() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = LocalChannel::new(AudioBackend::new(SyntheticAudioHost));
    {
        use labwired_bridge::{Channel, Command, Response};
        let mut send = |cmd: Command| channel.transact(&cmd).unwrap();
        assert_eq!(
            send(Command::SetMode {
                mode: StreamMode::Input
            }),
            Response::flag(true)
        );
        assert_eq!(
            send(Command::SetDevice {
                device: DEVICE_DEFAULT
            }),
            Response::Device { index: 0 }
        );
        assert_eq!(
            send(Command::SetFilename {
                base_dir: dir.path().to_path_buf(),
                name: "missing.wav".to_string(),
            }),
            Response::flag(false)
        );
    }
    assert_eq!(channel.server().session().target, StreamTarget::None);

    let mut client = BridgeClient::with_channel(Box::new(channel));
    assert!(!client.set_filename(dir.path(), "clip.mp3"));
    assert_eq!(client.set_device(42), DEVICE_DEFAULT);
}

#[test]
fn test_output_wav_is_written_and_replaced() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("out.wav");
    std::fs::write(&out, b"stale")?;

    let mut client =
        BridgeClient::with_channel(Box::new(LocalChannel::new(AudioBackend::new(
            SyntheticAudioHost,
        ))));
    assert!(client.set_mode(StreamMode::Output));
    assert!(client.set_filename(dir.path(), "out.wav"));
    assert!(!out.exists());
    assert!(client.configure(mono16()));
    assert!(client.enable());
    client.write(&[1, 0, 2, 0, 3]);
    client.write(&[0]);
    client.disable();

    let mut reader = hound::WavReader::open(&out)?;
    let got: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(got, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_disable_then_switch_mode() {
    let mut client =
        BridgeClient::with_channel(Box::new(LocalChannel::new(AudioBackend::new(
            SyntheticAudioHost,
        ))));
    assert!(client.set_mode(StreamMode::Output));
    assert!(client.configure(mono16()));
    assert!(client.enable());
    assert!(client.enable());
    assert!(!client.disable());
    assert!(client.set_mode(StreamMode::Input));
    assert!(client.enable());
    let (data, eos) = client.read(64);
    assert_eq!(data.len(), 64);
    assert!(!eos);
    assert!(client.set_mode(StreamMode::None));
    assert!(!client.disable());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_valid_audio_triples_read_exact_size(
        channels in 1u32..=4,
        sample_rate in prop::sample::select(vec![8000u32, 16000, 44100, 48000]),
        sample_bits in prop::sample::select(vec![8u32, 16, 24, 32]),
        blocks in 1u32..=8,
    ) {
        let size = blocks * 4;
        let mut client = BridgeClient::with_channel(Box::new(LocalChannel::new(
            AudioBackend::new(SyntheticAudioHost),
        )));
        prop_assert!(client.set_mode(StreamMode::Input));
        let format = StreamFormat::Audio(AudioFormat {
            channels,
            sample_rate,
            sample_bits,
        });
        prop_assert!(client.configure(format));
        prop_assert!(client.enable());
        let (data, _) = client.read(size);
        prop_assert_eq!(data.len(), size as usize);
    }
}
