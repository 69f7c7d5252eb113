//! Display method: as we can't impl the Display trait outside the module where it's defined, and
//! to not put these methods in the lib, use a wrapper
use std::collections::HashMap;
use std::fmt;

use rpzlib::index::{HaveBits, IpMatch, Rpzs};
use rpzlib::name::DomainName;
use rpzlib::policy::{decode_cname, Policy};
use rpzlib::zbits::{iter_zones, ZBits};
use rpzlib::zone::{TriggerKind, ZoneInfo};

pub struct DisplayWrapper<'a, T>(pub &'a T);

impl fmt::Display for DisplayWrapper<'_, IpMatch> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "zone:{} owner:{} prefix:{}",
            self.0.zone, self.0.owner, self.0.prefix
        )
    }
}

impl fmt::Display for DisplayWrapper<'_, HaveBits> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "qname:{:x} nsdname:{:x} ip:{:x} nsip:{:x}",
            self.0.qname,
            self.0.nsdname,
            self.0.ip(),
            self.0.nsip()
        )
    }
}

// One line per matched zone of a name lookup, with the decoded policy when
// the trigger file carried a target for the matching owner
pub fn display_name_match(
    rpzs: &Rpzs,
    zbits: ZBits,
    kind: TriggerKind,
    qname: &DomainName,
    targets: &HashMap<String, DomainName>,
) {
    for num in iter_zones(zbits) {
        let zone = match rpzs.zone(num) {
            Some(z) => z,
            None => continue,
        };
        match matching_owner(&zone, kind, qname, targets) {
            Some((owner, policy)) => {
                println!("zone:{} owner:{} policy:{}", num, owner, policy)
            }
            None => println!("zone:{} ({})", num, zone.origin),
        }
    }
}

// Reconstruct the owner name that matched: the exact spelling first, then
// the wildcard spelling of each ancestor
fn matching_owner(
    zone: &ZoneInfo,
    kind: TriggerKind,
    qname: &DomainName,
    targets: &HashMap<String, DomainName>,
) -> Option<(DomainName, Policy)> {
    let base = match kind {
        TriggerKind::Nsdname => &zone.nsdname_base,
        _ => &zone.origin,
    };

    let mut candidates = vec![qname.concat(base)];
    let mut cur = qname.parent();
    while let Some(parent) = cur {
        candidates.push(parent.to_wildcard().concat(base));
        cur = parent.parent();
    }

    for owner in candidates {
        if let Some(target) = targets.get(&owner.to_string()) {
            let policy = decode_cname(zone, std::slice::from_ref(target), &owner);
            return Some((owner, policy));
        }
    }
    None
}
