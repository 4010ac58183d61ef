// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Result;
use labwired_bridge::error::BridgeResult;
use labwired_bridge::{
    AudioBackend, BridgeClient, BridgeServer, Channel, Command, LocalChannel, Response,
    StreamMode, SyntheticAudioHost,
};
use labwired_config::{BridgeConfig, InstanceConfig, StreamKind};
use labwired_core::control::{Control, Status};
use labwired_core::peripherals::{self, audio, sensor, AudioStream, SensorStream};
use labwired_core::recording::RecordingWriter;
use labwired_core::timer::{TimerControl, IRQ_CLEAR, IRQ_STATUS, TIMER_CONTROL, TIMER_INTERVAL};
use labwired_core::vsi::REGS_OFFSET;
use labwired_core::{Peripheral, SimulationError, VirtualStreamInterface, Vsi, VsiSlot};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Answers every command positively and remembers what it was sent.
#[derive(Clone, Default)]
struct ScriptedChannel {
    sent: Arc<Mutex<Vec<Command>>>,
}

impl Channel for ScriptedChannel {
    fn transact(&mut self, command: &Command) -> BridgeResult<Response> {
        self.sent.lock().unwrap().push(command.clone());
        Ok(match command {
            Command::SetDevice { device } => Response::Device { index: *device },
            Command::Read { size } => Response::Data {
                data: vec![0xA5; *size as usize],
                eos: false,
            },
            _ => Response::flag(true),
        })
    }
}

fn local_audio() -> Vsi<AudioStream> {
    let channel = LocalChannel::new(AudioBackend::new(SyntheticAudioHost));
    let stream = AudioStream::new(
        BridgeClient::with_channel(Box::new(channel)),
        PathBuf::from("."),
    );
    Vsi::new(VsiSlot::new(0).unwrap(), stream)
}

fn reg(index: usize) -> u64 {
    REGS_OFFSET + 4 * index as u64
}

fn start_timer(vsi: &mut dyn VirtualStreamInterface, interval: u32) -> Result<()> {
    vsi.write_word(TIMER_INTERVAL, interval)?;
    let control = TimerControl::RUN | TimerControl::PERIODIC | TimerControl::TRIG_IRQ;
    vsi.write_word(TIMER_CONTROL, control.bits())?;
    Ok(())
}

#[test]
fn test_status_data_bit_is_read_to_clear() -> Result<()> {
    let mut vsi = local_audio();
    let control = Control::ENABLE | Control::CONTINUOUS | Control::with_mode(StreamMode::Input);
    vsi.write_word(reg(audio::FILENAME), 0)?;
    vsi.write_word(reg(0), control.bits())?;

    let status = vsi.read_word(reg(1))?;
    assert_ne!(status & Status::ACTIVE.bits(), 0);
    assert_eq!(status & Status::DATA.bits(), 0);

    let block = vsi.read_data_dma(64);
    assert_eq!(block.len(), 64);
    let first = vsi.read_word(reg(1))?;
    let second = vsi.read_word(reg(1))?;
    assert_ne!(first & Status::DATA.bits(), 0);
    assert_eq!(second & Status::DATA.bits(), 0);
    assert_eq!(second & Status::ACTIVE.bits(), Status::ACTIVE.bits());
    Ok(())
}

#[test]
fn test_filename_bytes_make_two_round_trips() {
    let channel = ScriptedChannel::default();
    let sent = channel.sent.clone();
    let stream = AudioStream::new(
        BridgeClient::with_channel(Box::new(channel)),
        PathBuf::from("/work"),
    );
    let mut vsi = Vsi::new(VsiSlot::new(1).unwrap(), stream);

    for byte in b"abc\0x\0" {
        vsi.write_register(audio::FILENAME, *byte as u32);
    }

    let names: Vec<(PathBuf, String)> = sent
        .lock()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            Command::SetFilename { base_dir, name } => Some((base_dir.clone(), name.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec![
            (PathBuf::from("/work"), "abc".to_string()),
            (PathBuf::from("/work"), "x".to_string()),
        ]
    );
    let status = Status::from_bits_retain(vsi.peek_register(1));
    assert!(status.contains(Status::FILE_NAME | Status::FILE_VALID));
    assert_eq!(vsi.read_register(audio::FILENAME), 1);
}

#[test]
fn test_one_shot_stream_disables_after_one_timer_event() -> Result<()> {
    let mut vsi = local_audio();
    vsi.write_word(reg(audio::FILENAME), 0)?;
    let control = Control::ENABLE | Control::with_mode(StreamMode::Input);
    vsi.write_word(reg(0), control.bits())?;
    assert_ne!(vsi.peek_register(1) & Status::ACTIVE.bits(), 0);

    start_timer(&mut vsi, 1000)?;
    vsi.timer_event();

    let control = Control::from_bits_retain(vsi.read_word(reg(0))?);
    assert!(!control.contains(Control::ENABLE));
    assert_eq!(control.mode(), StreamMode::Input);
    assert_eq!(vsi.read_word(reg(1))? & Status::ACTIVE.bits(), 0);
    assert_eq!(vsi.read_data_dma(16), vec![0; 16]);
    Ok(())
}

#[test]
fn test_stop_and_switch_mode_keeps_new_mode() -> Result<()> {
    let mut vsi = local_audio();
    vsi.write_word(reg(audio::FILENAME), 0)?;
    let control = Control::ENABLE | Control::CONTINUOUS | Control::with_mode(StreamMode::Input);
    vsi.write_word(reg(0), control.bits())?;
    assert_ne!(vsi.read_word(reg(1))? & Status::ACTIVE.bits(), 0);

    vsi.write_word(reg(0), Control::with_mode(StreamMode::Output).bits())?;
    let readback = Control::from_bits_retain(vsi.read_word(reg(0))?);
    assert_eq!(readback.mode(), StreamMode::Output);
    assert_eq!(vsi.read_word(reg(1))? & Status::ACTIVE.bits(), 0);

    vsi.write_word(reg(0), (Control::ENABLE | Control::with_mode(StreamMode::Output)).bits())?;
    assert_ne!(vsi.read_word(reg(1))? & Status::ACTIVE.bits(), 0);
    vsi.write_data_dma(&[0; 32]);
    assert_ne!(vsi.read_word(reg(1))? & Status::DATA.bits(), 0);

    vsi.write_word(reg(0), 0)?;
    assert_eq!(Control::from_bits_retain(vsi.read_word(reg(0))?).mode(), StreamMode::None);
    Ok(())
}

#[test]
fn test_dma_write_is_forwarded_only_while_active() {
    let channel = ScriptedChannel::default();
    let sent = channel.sent.clone();
    let stream = AudioStream::new(
        BridgeClient::with_channel(Box::new(channel)),
        PathBuf::from("."),
    );
    let mut vsi = Vsi::new(VsiSlot::new(3).unwrap(), stream);

    vsi.write_data_dma(&[1, 2, 3, 4]);
    let control = Control::ENABLE | Control::CONTINUOUS | Control::with_mode(StreamMode::Output);
    vsi.write_register(0, control.bits());
    vsi.write_data_dma(&[5, 6, 7, 8]);

    let writes: Vec<Vec<u8>> = sent
        .lock()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            Command::Write { data } => Some(data.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![vec![5, 6, 7, 8]]);
    assert_ne!(vsi.read_register(1) & Status::DATA.bits(), 0);
}

#[test]
fn test_word_and_byte_access_paths() -> Result<()> {
    let mut vsi = local_audio();
    assert_eq!(vsi.read_word(reg(audio::SAMPLE_RATE))?, 16000);
    assert_eq!(vsi.read_word(reg(audio::DEVICE))?, 0xFFFF_FFFF);

    vsi.write(reg(audio::CHANNELS), 2)?;
    assert_eq!(vsi.read(reg(audio::CHANNELS))?, 2);
    vsi.write(reg(audio::SAMPLE_RATE) + 1, 0xBB)?;
    assert_eq!(vsi.read_word(reg(audio::SAMPLE_RATE))?, 0xBB80);

    assert!(matches!(
        vsi.read_word(reg(0) + 2),
        Err(SimulationError::UnalignedAccess(_))
    ));
    assert!(matches!(
        vsi.write_word(0x0F0, 1),
        Err(SimulationError::MemoryViolation(0x0F0))
    ));
    // Unused user registers read as zero.
    assert_eq!(vsi.read_word(reg(40))?, 0);

    vsi.write_word(labwired_core::timer::IRQ_SET, 0b11)?;
    vsi.write_word(IRQ_CLEAR, 0b01)?;
    assert_eq!(vsi.read_word(IRQ_STATUS)?, 0b10);

    let slot = vsi.slot();
    assert_eq!(slot.base_address(true), 0x5FF0_0000);
    assert_eq!(VsiSlot::new(7).unwrap().base_address(false), 0x4FF7_0000);
    assert_eq!(VsiSlot::new(7).unwrap().irq(), 231);
    assert!(VsiSlot::new(8).is_none());
    Ok(())
}

fn write_recording(dir: &Path, name: &str, records: u32) -> Result<()> {
    let mut writer = RecordingWriter::create(dir.join(name))?;
    for i in 0..records {
        let base = (i * 4) as u8;
        writer.write_record(i * 10, &[base + 1, base + 2, base + 3, base + 4])?;
    }
    writer.finish()?;
    Ok(())
}

fn named_sensor(dir: &Path, name: &str) -> Vsi<SensorStream> {
    let mut vsi = Vsi::new(
        VsiSlot::new(2).unwrap(),
        SensorStream::new(dir.to_path_buf()),
    );
    vsi.write_register(sensor::SENSOR_NAME_LEN, name.len() as u32);
    for c in name.bytes() {
        vsi.write_register(sensor::SENSOR_NAME_CHAR, c as u32);
    }
    vsi
}

#[test]
fn test_sensor_fifo_threshold_and_overflow() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_recording(dir.path(), "acc.0.sds", 50)?;
    let mut vsi = named_sensor(dir.path(), "acc");
    assert_eq!(vsi.read_register(sensor::SENSOR_NAME_VALID), 1);

    vsi.write_register(sensor::SAMPLE_SIZE, 4);
    vsi.write_register(sensor::FIFO_SIZE, 8);
    vsi.write_register(sensor::DATA_THRESHOLD, 1);
    vsi.write_register(sensor::CONTROL, 1);
    assert_eq!(vsi.handler().fifo().capacity(), 8);

    start_timer(&mut vsi, 1000)?;
    // The interval write already measured the recording's 10 ms cadence.
    assert_eq!(vsi.block().interval(), 10_000);

    let result = vsi.timer_event();
    assert!(result.irq);
    assert_eq!(vsi.read_word(IRQ_STATUS)?, 0b01);
    assert_eq!(vsi.read_register(sensor::SAMPLE_COUNT), 1);
    let sample: Vec<u32> = (0..4).map(|_| vsi.read_register(sensor::SAMPLE_PORT)).collect();
    assert_eq!(sample, vec![1, 2, 3, 4]);
    assert_eq!(vsi.read_register(sensor::SAMPLE_COUNT), 0);
    vsi.write_word(IRQ_CLEAR, 0b01)?;

    for _ in 0..3 {
        vsi.timer_event();
    }
    assert_eq!(vsi.read_register(sensor::SAMPLE_COUNT), 2);
    assert_ne!(vsi.read_word(IRQ_STATUS)? & 0b10, 0);
    assert_eq!(vsi.read_register(sensor::STATUS), 1);
    assert_eq!(vsi.read_register(sensor::STATUS), 0);
    assert_eq!(vsi.read_register(sensor::SAMPLE_PORT), 5);

    vsi.write_register(sensor::CONTROL, 0);
    vsi.write_register(sensor::CONTROL, 1);
    assert!(vsi
        .handler()
        .recording_path()
        .ends_with("acc.2.sds"));
    Ok(())
}

#[test]
fn test_sensor_interval_changes_only_on_interval_write() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut writer = RecordingWriter::create(dir.path().join("mag.0.sds"))?;
    for i in 0..1000u32 {
        writer.write_record(i * 10, &[1, 2, 3, 4])?;
    }
    for i in 0..1000u32 {
        writer.write_record(10_000 + i * 20, &[5, 6, 7, 8])?;
    }
    writer.finish()?;

    let mut vsi = named_sensor(dir.path(), "mag");
    vsi.write_register(sensor::SAMPLE_SIZE, 4);
    vsi.write_register(sensor::FIFO_SIZE, 8);
    vsi.write_register(sensor::CONTROL, 1);
    start_timer(&mut vsi, 1000)?;
    assert_eq!(vsi.block().interval(), 10_000);

    // Well past one slide; the recording has started to slow down.
    for _ in 0..150 {
        vsi.timer_event();
    }
    assert_eq!(vsi.block().interval(), 10_000);

    vsi.write_word(TIMER_INTERVAL, 10_000)?;
    let interval = vsi.block().interval();
    assert!((10_500..=11_200).contains(&interval), "interval {}", interval);
    Ok(())
}

#[test]
fn test_sensor_dma_blocks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_recording(dir.path(), "gyro.0.sds", 20)?;
    let mut vsi = named_sensor(dir.path(), "gyro");
    vsi.write_register(sensor::FIFO_SIZE, 8);
    vsi.write_register(sensor::CONTROL, 0b11);
    start_timer(&mut vsi, 1000)?;

    assert!(vsi.timer_event().irq);
    assert_eq!(vsi.read_data_dma(8), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(vsi.handler().fifo().count(), 0);
    Ok(())
}

#[test]
fn test_unreachable_server_degrades_instance() -> Result<()> {
    let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let config = InstanceConfig {
        id: "mic".to_string(),
        vsi: 5,
        kind: StreamKind::Audio,
        bridge: Some(BridgeConfig {
            address: format!("127.0.0.1:{}", port),
            authkey: "vsi_audio".to_string(),
            connect_attempts: 2,
            retry_delay_ms: 10,
        }),
        work_dir: None,
    };
    let mut vsi = peripherals::build(&config)?;
    assert_eq!(vsi.kind(), StreamKind::Audio);

    vsi.write_word(reg(audio::FILENAME), 0)?;
    let control = Control::ENABLE | Control::CONTINUOUS | Control::with_mode(StreamMode::Input);
    vsi.write_word(reg(0), control.bits())?;
    assert_eq!(vsi.read_word(reg(1))? & Status::ACTIVE.bits(), 0);
    assert_eq!(vsi.read_data_dma(32), vec![0; 32]);
    vsi.write_data_dma(&[1, 2, 3, 4]);
    assert_eq!(vsi.snapshot()["stream"]["connection"], "Disconnected");
    Ok(())
}

#[test]
fn test_audio_instance_over_tcp() -> Result<()> {
    let server = BridgeServer::bind(
        "127.0.0.1:0",
        "vsi_audio",
        AudioBackend::new(SyntheticAudioHost),
    )?;
    let address = server.local_addr()?.to_string();
    let handle = std::thread::spawn(move || server.run());

    let config = InstanceConfig {
        id: "mic".to_string(),
        vsi: 0,
        kind: StreamKind::Audio,
        bridge: Some(BridgeConfig {
            address,
            authkey: "vsi_audio".to_string(),
            connect_attempts: 5,
            retry_delay_ms: 1000,
        }),
        work_dir: None,
    };
    let mut vsi = peripherals::build(&config)?;
    vsi.write_word(reg(audio::FILENAME), 0)?;
    let control = Control::ENABLE | Control::CONTINUOUS | Control::with_mode(StreamMode::Input);
    vsi.write_word(reg(0), control.bits())?;
    assert_ne!(vsi.read_word(reg(1))? & Status::ACTIVE.bits(), 0);
    assert_eq!(vsi.read_data_dma(64).len(), 64);

    // Dropping the instance closes the bridge and stops the server.
    drop(vsi);
    handle.join().unwrap()?;
    Ok(())
}
