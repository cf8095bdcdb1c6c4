//! Adapts a `tun` device to the `interceptor_core::link` traits so the
//! datapath can read and write real IPv4 frames without knowing anything
//! about TUN specifically.

use async_trait::async_trait;
use interceptor_core::link::{LinkReader, LinkWriter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tun::AsyncDevice;

const MTU: usize = 1500;

pub fn open(name: &str, address: std::net::Ipv4Addr, netmask: std::net::Ipv4Addr) -> std::io::Result<AsyncDevice> {
    let mut config = tun::Configuration::default();
    config
        .name(name)
        .address(address)
        .netmask(netmask)
        .mtu(MTU as i32)
        .up();
    tun::create_as_async(&config).map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error))
}

pub struct TunReader(pub tokio::io::ReadHalf<AsyncDevice>);

#[async_trait]
impl LinkReader for TunReader {
    async fn read_frame(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; MTU];
        let n = self.0.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

pub struct TunWriter(pub tokio::io::WriteHalf<AsyncDevice>);

#[async_trait]
impl LinkWriter for TunWriter {
    async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.0.write_all(frame).await
    }
}
