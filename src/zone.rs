//! Per-zone records. A policy zone is known to the index by its origin, its
//! stable ordinal, the marker subdomains that tag address and nameserver
//! triggers, and the sentinel targets recognized while decoding its records.
use std::fmt;

use crate::error::{RPZError, RPZResult};
use crate::ipkey::{name2ipkey, IpKey};
use crate::name::DomainName;
use crate::zbits::ZoneNum;

use rpz_derive::RpzEnum;

// Conventional subnames of a policy zone
const MARKER_IP: &str = "rpz-ip";
const MARKER_NSIP: &str = "rpz-nsip";
const MARKER_NSDNAME: &str = "rpz-nsdname";
const LABEL_PASSTHRU: &str = "rpz-passthru";
const LABEL_DROP: &str = "rpz-drop";
const LABEL_TCP_ONLY: &str = "rpz-tcp-only";

/// What a trigger owner name keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RpzEnum)]
#[repr(u8)]
pub enum TriggerKind {
    Qname = 0,
    Ip = 1,
    Nsdname = 2,
    Nsip = 3,
}

/// The log spelling of a trigger kind.
pub fn type2str(kind: TriggerKind) -> &'static str {
    match kind {
        TriggerKind::Qname => "qname",
        TriggerKind::Ip => "ip",
        TriggerKind::Nsdname => "nsdname",
        TriggerKind::Nsip => "nsip",
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", type2str(*self))
    }
}

/// A classified trigger: what the owner name meant once the zone origin and
/// the marker label are stripped off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Qname { name: DomainName, wild: bool },
    Nsdname { name: DomainName, wild: bool },
    Ip { key: IpKey, prefix: u8 },
    Nsip { key: IpKey, prefix: u8 },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Qname { .. } => TriggerKind::Qname,
            Trigger::Ip { .. } => TriggerKind::Ip,
            Trigger::Nsdname { .. } => TriggerKind::Nsdname,
            Trigger::Nsip { .. } => TriggerKind::Nsip,
        }
    }
}

#[derive(Debug)]
pub struct ZoneInfo {
    pub num: ZoneNum,
    pub origin: DomainName,
    /// `rpz-ip.<origin>`, base of the answer-address triggers
    pub ip_base: DomainName,
    /// `rpz-nsip.<origin>`, base of the nameserver-address triggers
    pub nsip_base: DomainName,
    /// `rpz-nsdname.<origin>`, base of the nameserver-name triggers
    pub nsdname_base: DomainName,
    /// CNAME targets with a fixed meaning in this zone
    pub passthru: DomainName,
    pub drop: DomainName,
    pub tcp_only: DomainName,
}

impl ZoneInfo {
    pub fn new(num: ZoneNum, origin: DomainName) -> Self {
        let sub = |label: &str| {
            DomainName::from_labels(vec![String::from(label)]).concat(&origin)
        };
        ZoneInfo {
            num,
            ip_base: sub(MARKER_IP),
            nsip_base: sub(MARKER_NSIP),
            nsdname_base: sub(MARKER_NSDNAME),
            passthru: sub(LABEL_PASSTHRU),
            drop: sub(LABEL_DROP),
            tcp_only: sub(LABEL_TCP_ONLY),
            origin,
        }
    }

    /// Classify a trigger owner name from this zone. The marker label right
    /// above the origin decides the kind; everything else is a qname trigger.
    pub fn classify(&self, owner: &DomainName) -> RPZResult<Trigger> {
        let rel = owner.strip_suffix(&self.origin).ok_or_else(|| {
            RPZError::bad_name(&owner.to_string(), "not below the zone origin")
        })?;

        let (marker, lead) = match rel.labels().split_last() {
            Some((marker, lead)) => (marker.as_str(), lead),
            // the zone apex itself: a qname trigger for the root
            None => return Ok(Trigger::Qname { name: DomainName::root(), wild: false }),
        };

        match marker {
            MARKER_IP => {
                let (key, prefix) = name2ipkey(lead)?;
                Ok(Trigger::Ip { key, prefix })
            }
            MARKER_NSIP => {
                let (key, prefix) = name2ipkey(lead)?;
                Ok(Trigger::Nsip { key, prefix })
            }
            MARKER_NSDNAME => {
                let name = DomainName::from_labels(lead.to_vec());
                let (name, wild) = split_wildcard(name);
                Ok(Trigger::Nsdname { name, wild })
            }
            _ => {
                let (name, wild) = split_wildcard(rel);
                Ok(Trigger::Qname { name, wild })
            }
        }
    }
}

/// A wildcard owner contributes to its parent's wildcard bits.
fn split_wildcard(name: DomainName) -> (DomainName, bool) {
    if name.is_wildcard() {
        // a wildcard always has a parent
        (name.parent().unwrap_or_default(), true)
    } else {
        (name, false)
    }
}

/// Trigger counters of one zone, split the way the aggregate bitmaps need
/// them: address kinds count per family.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriggerCounts {
    pub qname: u32,
    pub nsdname: u32,
    pub ipv4: u32,
    pub ipv6: u32,
    pub nsipv4: u32,
    pub nsipv6: u32,
}

impl TriggerCounts {
    pub fn total(&self) -> u32 {
        self.qname + self.nsdname + self.ipv4 + self.ipv6 + self.nsipv4 + self.nsipv6
    }
}

impl fmt::Display for TriggerCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "qname:{} nsdname:{} ip:{}/{} nsip:{}/{}",
            self.qname, self.nsdname, self.ipv4, self.ipv6, self.nsipv4, self.nsipv6
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dname;

    fn zone() -> ZoneInfo {
        ZoneInfo::new(0, dname!("policy.example"))
    }

    #[test]
    fn derived_names() {
        let z = zone();
        assert_eq!(z.ip_base.to_string(), "rpz-ip.policy.example.");
        assert_eq!(z.nsip_base.to_string(), "rpz-nsip.policy.example.");
        assert_eq!(z.nsdname_base.to_string(), "rpz-nsdname.policy.example.");
        assert_eq!(z.passthru.to_string(), "rpz-passthru.policy.example.");
        assert_eq!(z.drop.to_string(), "rpz-drop.policy.example.");
        assert_eq!(z.tcp_only.to_string(), "rpz-tcp-only.policy.example.");
    }

    #[test]
    fn classify_qname() {
        let z = zone();
        let t = z.classify(&dname!("bad.evil.example.policy.example")).unwrap();
        assert_eq!(
            t,
            Trigger::Qname {
                name: dname!("bad.evil.example"),
                wild: false
            }
        );
        assert_eq!(t.kind(), TriggerKind::Qname);
    }

    #[test]
    fn classify_wildcard_qname() {
        let z = zone();
        let t = z.classify(&dname!("*.evil.example.policy.example")).unwrap();
        assert_eq!(
            t,
            Trigger::Qname {
                name: dname!("evil.example"),
                wild: true
            }
        );
    }

    #[test]
    fn classify_ip_kinds() {
        let z = zone();
        let t = z
            .classify(&dname!("32.1.1.1.10.rpz-ip.policy.example"))
            .unwrap();
        match t {
            Trigger::Ip { prefix, .. } => assert_eq!(prefix, 128),
            other => panic!("wrong kind: {:?}", other),
        }

        let t = z
            .classify(&dname!("48.zz.1.2.2001.rpz-nsip.policy.example"))
            .unwrap();
        assert_eq!(t.kind(), TriggerKind::Nsip);
    }

    #[test]
    fn classify_nsdname() {
        let z = zone();
        let t = z
            .classify(&dname!("*.ns.evil.example.rpz-nsdname.policy.example"))
            .unwrap();
        assert_eq!(
            t,
            Trigger::Nsdname {
                name: dname!("ns.evil.example"),
                wild: true
            }
        );
    }

    #[test]
    fn classify_rejects_foreign_and_malformed_owners() {
        let z = zone();
        assert!(z.classify(&dname!("bad.evil.example.other.zone")).is_err());
        assert!(z
            .classify(&dname!("24.1.1.1.10.rpz-ip.policy.example"))
            .is_err());
        assert!(z
            .classify(&dname!("32.1.1.256.10.rpz-ip.policy.example"))
            .is_err());
    }

    #[test]
    fn trigger_kind_strings() {
        use std::str::FromStr;

        assert_eq!(type2str(TriggerKind::Ip), "ip");
        assert_eq!(TriggerKind::Nsdname.to_string(), "nsdname");
        assert_eq!(TriggerKind::from_str("NSIP").unwrap(), TriggerKind::Nsip);
        assert_eq!(TriggerKind::try_from(1u8).unwrap(), TriggerKind::Ip);
        assert!(TriggerKind::from_str("client-ip").is_err());
    }
}
