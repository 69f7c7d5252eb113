//! Module for some utility functions, including debug
//!
use crate::error::RPZResult;
use crate::index::Rpzs;
use crate::zbits::{check_zone_num, zbit, ZBits};

// Parse a comma separated list of zone ordinals into a zone bit set
pub fn parse_zbits(s: &str) -> RPZResult<ZBits> {
    let mut zbits = 0;
    for part in s.split(',').filter(|p| !p.trim().is_empty()) {
        let num = part.trim().parse::<usize>()?;
        zbits |= zbit(check_zone_num(num)?);
    }
    Ok(zbits)
}

// Debug utility: dump the registry, the counters and the aggregates
pub fn pretty_rpzs(rpzs: &Rpzs) {
    eprintln!("zones={}", rpzs.num_zones());
    for num in 0..rpzs.num_zones() {
        // registration enforced the ordinal limit
        let num = num as u8;
        if let (Some(zone), Some(counts)) = (rpzs.zone(num), rpzs.counts(num)) {
            eprintln!("  #{} {} {}", num, zone.origin, counts);
        }
    }

    let have = rpzs.have();
    eprintln!(
        "have: qname={:x} nsdname={:x} ip={:x} nsip={:x} skip-recurse={:x}",
        have.qname,
        have.nsdname,
        have.ip(),
        have.nsip(),
        have.qname_skip_recurse
    );
}
