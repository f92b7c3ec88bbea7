//! Raw IPv4 ICMP socket driven by the tokio reactor
//!
//! Opening the socket needs `CAP_NET_RAW` (or root). Datagrams are received
//! with their IPv4 header; sends carry only the ICMP message and the kernel
//! builds the IP header.

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;

pub struct RawSocket {
    fd: AsyncFd<OwnedFd>,
}

impl RawSocket {
    /// Open an ICMP socket, bound to `local` unless it is unspecified
    pub fn icmp_v4(local: Ipv4Addr) -> io::Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_ICMP) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        set_nonblocking(fd.as_raw_fd())?;
        if !local.is_unspecified() {
            let addr = sockaddr_v4(local);
            let rc = unsafe {
                libc::bind(
                    fd.as_raw_fd(),
                    &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(Self {
            fd: AsyncFd::new(fd)?,
        })
    }

    /// Receive one datagram, IPv4 header included
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| recv_from(inner.as_raw_fd(), &mut *buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    pub async fn send_to(&self, buf: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| send_to(inner.as_raw_fd(), buf, dest)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn sockaddr_v4(addr: Ipv4Addr) -> libc::sockaddr_in {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from_ne_bytes(addr.octets()),
    };
    sin
}

fn recv_from(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let n = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            &mut sin as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((n as usize, Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes())))
}

fn send_to(fd: RawFd, buf: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
    let addr = sockaddr_v4(dest);
    let n = unsafe {
        libc::sendto(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            0,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockaddr_network_order() {
        let sin = sockaddr_v4(Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(sin.sin_addr.s_addr.to_ne_bytes(), [192, 168, 1, 20]);
        assert_eq!(sin.sin_port, 0);
        assert_eq!(sin.sin_family, libc::AF_INET as libc::sa_family_t);
    }
}
