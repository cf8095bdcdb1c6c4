//! Resolves the real address behind an intercepted destination. The
//! datapath itself never does DNS; a flow's peer endpoint carries
//! whatever address the child's own resolver already decided on, and the
//! proxy only needs a name to connect out with when that address isn't
//! routable from here (it always is, for this tool, since the child and
//! this process share no network) -- so this module resolves by the
//! `Host` header instead of the intercepted IP.

use std::io;
use std::net::SocketAddr;

use tokio::net::lookup_host;

pub async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address found for {host}")))
}
