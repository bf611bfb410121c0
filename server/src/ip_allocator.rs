use std::fmt;
use std::str::FromStr;

use crate::error::ServerError;

/// A bare 4-octet IPv4 address with the original's wraparound
/// incrementing scheme: each octet cycles `1..=254` (0 and 255 are
/// never assigned — network and broadcast-shaped addresses are
/// skipped), carrying into the next octet on overflow. Octet 0
/// overflowing is a fleet-ending condition rather than something
/// a single allocation attempt can recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpAddress {
    octets: [u8; 4],
}

impl IpAddress {
    pub fn new(octets: [u8; 4]) -> Self {
        Self { octets }
    }

    pub fn increment(&mut self) -> Result<(), ServerError> {
        if self.octets[3] < 254 {
            self.octets[3] += 1;
        } else {
            self.octets[3] = 1;
            if self.octets[2] < 254 {
                self.octets[2] += 1;
            } else {
                self.octets[2] = 1;
                if self.octets[1] < 254 {
                    self.octets[1] += 1;
                } else {
                    self.octets[1] = 1;
                    if self.octets[0] < 254 {
                        self.octets[0] += 1;
                    } else {
                        return Err(ServerError::AddressSpaceExhausted);
                    }
                }
            }
        }
        Ok(())
    }

    /// `<address>/32`, the form persisted on `Peer::allowed_ips`.
    pub fn to_slash_32(self) -> String {
        format!("{self}/32")
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.octets[0], self.octets[1], self.octets[2], self.octets[3])
    }
}

impl FromStr for IpAddress {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        for (i, part) in s.split('.').enumerate() {
            let octet: u8 = part
                .parse()
                .map_err(|_| ServerError::InvalidQuery(format!("invalid ip address: {s}")))?;
            *octets
                .get_mut(i)
                .ok_or_else(|| ServerError::InvalidQuery(format!("invalid ip address: {s}")))? = octet;
        }
        Ok(Self { octets })
    }
}

/// Finds the next `/32` not already assigned to a peer on the device,
/// starting one past `base` (the interface's own address). Mirrors
/// `Handlers.go#PostPeers`'s `findIP:` loop: scan the live device
/// snapshot rather than the database, since the device is the
/// authoritative record of what's actually routed on this server right
/// now.
pub fn next_unassigned(base: IpAddress, taken: &[String]) -> Result<IpAddress, ServerError> {
    let mut candidate = base;
    candidate.increment()?;
    loop {
        let slash32 = candidate.to_slash_32();
        if !taken.iter().any(|ip| ip == &slash32) {
            return Ok(candidate);
        }
        candidate.increment()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_last_octet() {
        let mut ip = IpAddress::new([10, 0, 0, 5]);
        ip.increment().unwrap();
        assert_eq!(ip.to_string(), "10.0.0.6");
    }

    #[test]
    fn skips_zero_and_255_via_carry() {
        let mut ip = IpAddress::new([10, 0, 0, 254]);
        ip.increment().unwrap();
        assert_eq!(ip.to_string(), "10.0.1.1");
    }

    #[test]
    fn carries_through_all_octets() {
        let mut ip = IpAddress::new([10, 254, 254, 254]);
        ip.increment().unwrap();
        assert_eq!(ip.to_string(), "11.1.1.1");
    }

    #[test]
    fn octet_zero_overflow_is_fatal() {
        let mut ip = IpAddress::new([254, 254, 254, 254]);
        assert!(matches!(ip.increment(), Err(ServerError::AddressSpaceExhausted)));
    }

    #[test]
    fn parses_dotted_quad() {
        let ip: IpAddress = "10.10.0.1".parse().unwrap();
        assert_eq!(ip.to_string(), "10.10.0.1");
    }

    #[test]
    fn next_unassigned_skips_taken() {
        let base: IpAddress = "10.0.0.1".parse().unwrap();
        let taken = vec!["10.0.0.2/32".to_string(), "10.0.0.3/32".to_string()];
        let next = next_unassigned(base, &taken).unwrap();
        assert_eq!(next.to_slash_32(), "10.0.0.4/32");
    }
}
