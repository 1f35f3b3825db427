//! GTP Path Management
//!
//! GTP-C socket for the S5/S8 interface. Receives datagrams for the main
//! loop and flushes messages queued by committed transactions.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;

use crate::context::SmfContext;
use crate::error::SmfResult;
use crate::gtp_xact::GtpXactManager;

/// Largest GTP-C datagram accepted
pub const MAX_SDU_LEN: usize = 8192;

/// GTP-C path
#[derive(Debug)]
pub struct GtpPath {
    socket: UdpSocket,
}

impl GtpPath {
    /// Bind the GTP-C socket
    pub async fn open(addr: SocketAddr) -> SmfResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        log::info!("gtp_server() [{}]", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> SmfResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive one datagram
    pub async fn recv(&self) -> SmfResult<(SocketAddr, Bytes)> {
        let mut buf = vec![0u8; MAX_SDU_LEN];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        log::trace!("GTP-C received {} bytes from {}", len, from);
        Ok((from, Bytes::from(buf)))
    }

    /// Send every queued message to its gateway node
    pub async fn flush(&self, xact_mgr: &mut GtpXactManager, ctx: &SmfContext) -> SmfResult<usize> {
        let mut sent = 0;
        for msg in xact_mgr.drain_outbound() {
            let Some(node) = ctx.gnode(msg.gnode) else {
                log::warn!("No GTP node id={}, {} bytes dropped", msg.gnode.0, msg.data.len());
                continue;
            };
            self.socket.send_to(&msg.data, node.addr).await?;
            log::trace!("GTP-C sent {} bytes to {}", msg.data.len(), node.addr);
            sent += 1;
        }
        Ok(sent)
    }
}
