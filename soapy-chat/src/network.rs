use std::{
    io,
    net::{IpAddr, Ipv4Addr, UdpSocket},
};

/// Best-effort address other machines on the LAN can reach us on. Only used
/// for the start-up banner.
///
/// Connecting a UDP socket sends nothing; it just makes the OS pick the
/// outbound interface. Falls back to loopback when there is no route.
pub fn lan_ip() -> IpAddr {
    probe_outbound_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn probe_outbound_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(("8.8.8.8", 80))?;
    Ok(socket.local_addr()?.ip())
}
