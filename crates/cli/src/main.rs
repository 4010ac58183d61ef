// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::Parser;
use labwired_bridge::{AudioBackend, BridgeServer, SyntheticAudioHost, SyntheticVideoHost, VideoBackend};
use labwired_config::{BridgeConfig, StreamKind, VsiManifest};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LabWired VSI stream server",
    long_about = "Serves one audio or video bridge client, then exits."
)]
struct Cli {
    /// Stream kind to serve: audio or video
    #[arg(short, long)]
    kind: Option<StreamKind>,

    /// VSI manifest (YAML) to take kind and endpoint from
    #[arg(short, long, requires = "instance")]
    manifest: Option<PathBuf>,

    /// Instance id inside the manifest
    #[arg(long)]
    instance: Option<String>,

    /// Listen address (overrides the configured host)
    #[arg(long)]
    ip: Option<IpAddr>,

    /// Listen port (overrides the configured port)
    #[arg(long)]
    port: Option<u16>,

    /// Shared key clients must prove knowledge of
    #[arg(long)]
    authkey: Option<String>,

    /// Enable per-command tracing
    #[arg(short, long)]
    trace: bool,
}

#[derive(Debug)]
struct Endpoint {
    kind: StreamKind,
    addr: SocketAddr,
    authkey: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let endpoint = match resolve_endpoint(&cli) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match serve(&endpoint) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn resolve_endpoint(cli: &Cli) -> anyhow::Result<Endpoint> {
    let (kind, bridge) = match &cli.manifest {
        Some(path) => {
            let manifest = VsiManifest::from_file(path)?;
            let id = cli.instance.as_deref().unwrap_or_default();
            let instance = manifest
                .instance(id)
                .with_context(|| format!("Instance '{}' not found in {:?}", id, path))?;
            if cli.kind.is_some_and(|k| k != instance.kind) {
                anyhow::bail!(
                    "--kind {} conflicts with instance '{}' ({})",
                    cli.kind.unwrap_or(instance.kind),
                    id,
                    instance.kind
                );
            }
            (instance.kind, instance.bridge_or_default())
        }
        None => {
            let kind = cli
                .kind
                .context("Missing required --kind argument (or --manifest/--instance)")?;
            (kind, BridgeConfig::for_kind(kind))
        }
    };

    let Some(bridge) = bridge else {
        anyhow::bail!("{} instances replay local recordings and need no server", kind);
    };

    let mut addr = bridge.socket_addr()?;
    if let Some(ip) = cli.ip {
        addr.set_ip(ip);
    }
    if let Some(port) = cli.port {
        addr.set_port(port);
    }
    let authkey = cli.authkey.clone().unwrap_or(bridge.authkey);
    if authkey.is_empty() {
        anyhow::bail!("--authkey cannot be empty");
    }

    Ok(Endpoint {
        kind,
        addr,
        authkey,
    })
}

fn serve(endpoint: &Endpoint) -> anyhow::Result<()> {
    info!("Starting {} stream server", endpoint.kind);
    let addr = endpoint.addr.to_string();
    match endpoint.kind {
        StreamKind::Audio => {
            BridgeServer::bind(&addr, &endpoint.authkey, AudioBackend::new(SyntheticAudioHost))?
                .run()?
        }
        StreamKind::Video => {
            BridgeServer::bind(&addr, &endpoint.authkey, VideoBackend::new(SyntheticVideoHost))?
                .run()?
        }
        StreamKind::Sensor => anyhow::bail!("sensor streams have no server"),
    }
    Ok(())
}
