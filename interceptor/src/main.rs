mod ca;
mod cli;
mod config;
mod dns;
mod har;
mod netns;
mod pretty;
mod proxy;
mod trust_store;
mod tun;

use std::sync::Arc;

use interceptor_core::tcp::engine::TcpEngine;
use interceptor_core::udp::engine::UdpEngine;
use interceptor_core::{link, shutdown::Shutdown, Mux, Pattern};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::ca::CertificateAuthority;
use crate::har::HarRecorder;
use crate::proxy::{http::HttpProxy, tls::TlsProxy};

const TUN_NAME: &str = "tun0";
const OUTBOUND_CAPACITY: usize = 256;

#[tokio::main]
async fn main() {
    let config = cli::parse();

    let ca = match CertificateAuthority::generate() {
        Ok(ca) => Arc::new(ca),
        Err(error) => {
            eprintln!("failed to generate certificate authority: {error}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &config.ca_cert_path {
        if let Err(error) = trust_store::write_ca_cert(&ca, path) {
            eprintln!("failed to write ca certificate to {}: {error}", path.display());
            std::process::exit(1);
        }
        info!(path = %path.display(), "wrote ca certificate");
    }

    let har = Arc::new(HarRecorder::new(config.har_path.clone()));

    let tun_device = match tun::open(TUN_NAME, config.tun_address, config.tun_netmask) {
        Ok(device) => device,
        Err(error) => {
            eprintln!("failed to open tun device (are you running as root?): {error}");
            std::process::exit(1);
        }
    };
    let (tun_read, tun_write) = tokio::io::split(tun_device);

    let child = match netns::spawn_isolated(
        &config.child_command,
        TUN_NAME,
        config.tun_address,
        config.tun_netmask,
    ) {
        Ok(child) => child,
        Err(error) => {
            eprintln!("failed to spawn child process: {error}");
            std::process::exit(1);
        }
    };

    let mut mux = Mux::new();
    mux.register_tcp(Pattern::Port(80), Arc::new(HttpProxy::new(Arc::clone(&har))));
    mux.register_tcp(
        Pattern::Port(443),
        Arc::new(TlsProxy::new(Arc::clone(&ca), Arc::clone(&har))),
    );
    let mux = Arc::new(mux);

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let tcp = Arc::new(TcpEngine::new(Arc::clone(&mux), config.tcp, outbound_tx.clone()));
    let udp = Arc::new(UdpEngine::new(mux, config.udp, outbound_tx));

    let shutdown = Shutdown::new();
    let link_shutdown = shutdown.clone();
    let link_task = tokio::spawn(link::run_link(
        Box::new(tun::TunReader(tun_read)),
        Box::new(tun::TunWriter(tun_write)),
        tcp,
        udp,
        outbound_rx,
        link_shutdown,
    ));

    let exit_status = wait_for_child(child, shutdown.clone()).await;
    shutdown.shut_down_with_status(exit_status);
    let _ = link_task.await;

    if let Err(error) = har.flush() {
        error!(%error, "failed to write har recording");
    }

    if let interceptor_core::shutdown::ExitStatus::Status(code) = exit_status {
        std::process::exit(code as i32);
    }
}

async fn wait_for_child(
    mut child: std::process::Child,
    shutdown: Shutdown,
) -> interceptor_core::shutdown::ExitStatus {
    let handle = tokio::task::spawn_blocking(move || child.wait());
    tokio::select! {
        result = handle => match result {
            Ok(Ok(status)) => interceptor_core::shutdown::ExitStatus::Status(status.code().unwrap_or(0) as u32),
            Ok(Err(error)) => {
                error!(%error, "failed to wait on child process");
                interceptor_core::shutdown::ExitStatus::Exited
            }
            Err(error) => {
                error!(%error, "child wait task panicked");
                interceptor_core::shutdown::ExitStatus::Exited
            }
        },
        status = shutdown.wait_for_shutdown() => status,
        _ = tokio::signal::ctrl_c() => {
            shutdown.shut_down();
            interceptor_core::shutdown::ExitStatus::Exited
        }
    }
}
