//! Runtime configuration assembled from CLI arguments, kept as a single
//! struct so the rest of the binary never reaches back into `clap` types.

use std::path::PathBuf;

use interceptor_core::tcp::engine::EngineConfig as TcpEngineConfig;
use interceptor_core::udp::engine::EngineConfig as UdpEngineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// The command (and its arguments) to run inside the isolated network
    /// namespace.
    pub child_command: Vec<String>,
    /// Verbosity: 0 is warnings only, 1 is info, 2+ is debug and above.
    pub verbosity: i8,
    /// Where to write the HAR recording of intercepted exchanges, if at all.
    pub har_path: Option<PathBuf>,
    /// Where to write the freshly minted CA certificate in PEM form, so it
    /// can be installed into the child's trust store before it runs.
    pub ca_cert_path: Option<PathBuf>,
    pub tcp: TcpEngineConfig,
    pub udp: UdpEngineConfig,
    /// Address assigned to the TUN device inside the isolated namespace.
    pub tun_address: std::net::Ipv4Addr,
    pub tun_netmask: std::net::Ipv4Addr,
}

impl Config {
    pub fn new(child_command: Vec<String>, verbosity: i8) -> Self {
        Self {
            child_command,
            verbosity,
            har_path: None,
            ca_cert_path: None,
            tcp: TcpEngineConfig::default(),
            udp: UdpEngineConfig::default(),
            tun_address: std::net::Ipv4Addr::new(10, 66, 0, 1),
            tun_netmask: std::net::Ipv4Addr::new(255, 255, 255, 0),
        }
    }
}
