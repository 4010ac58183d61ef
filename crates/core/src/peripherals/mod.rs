// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod audio;
pub mod sensor;
pub mod video;

pub use audio::AudioStream;
pub use sensor::SensorStream;
pub use video::VideoStream;

use crate::vsi::{VirtualStreamInterface, Vsi, VsiSlot};
use labwired_bridge::BridgeClient;
use labwired_config::{InstanceConfig, StreamKind};

/// Instantiate one configured VSI peripheral.
///
/// Bridged kinds connect to their server here; a failed connection leaves
/// the instance degraded rather than failing construction.
pub fn build(config: &InstanceConfig) -> anyhow::Result<Box<dyn VirtualStreamInterface>> {
    let slot = VsiSlot::new(config.vsi).ok_or_else(|| {
        anyhow::anyhow!("Instance '{}': invalid VSI slot {}", config.id, config.vsi)
    })?;
    let work_dir = config.work_dir_or_current();
    tracing::info!(
        "VSI{} '{}' ({}) at {:#x}, IRQ {}",
        slot.index(),
        config.id,
        config.kind,
        slot.base_address(true),
        slot.irq()
    );

    let bridge = || {
        config.bridge_or_default().ok_or_else(|| {
            anyhow::anyhow!("Instance '{}': no bridge endpoint for {}", config.id, config.kind)
        })
    };
    let peripheral: Box<dyn VirtualStreamInterface> = match config.kind {
        StreamKind::Audio => {
            let client = BridgeClient::connect(&bridge()?);
            Box::new(Vsi::new(slot, AudioStream::new(client, work_dir)))
        }
        StreamKind::Video => {
            let client = BridgeClient::connect(&bridge()?);
            Box::new(Vsi::new(slot, VideoStream::new(client, work_dir)))
        }
        StreamKind::Sensor => Box::new(Vsi::new(slot, SensorStream::new(work_dir))),
    };
    Ok(peripheral)
}
