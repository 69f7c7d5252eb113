//! Policy actions. A policy zone record's CNAME-like target encodes what the
//! resolver should do when the trigger fires; this module decodes the target
//! into an action and maps actions to and from configuration strings.
use std::fmt;
use std::str::FromStr;

use crate::name::DomainName;
use crate::zone::ZoneInfo;

use rpz_derive::RpzEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, RpzEnum)]
#[repr(u8)]
pub enum Policy {
    /// Apply whatever the matched record says
    Given = 0,
    Disabled = 1,
    Passthru = 2,
    Drop = 3,
    TcpOnly = 4,
    Nxdomain = 5,
    Nodata = 6,
    Cname = 7,
    /// Rewrite using the record's own rdata
    Record = 8,
    /// Rewrite substituting the query name into a wildcard target
    Wildcname = 9,
    Error = 10,
}

/// Decode the first CNAME target of a policy record into an action. The
/// order of the checks matters: the root and wildcard spellings win over the
/// per-zone sentinel names, and a record pointing at its own owner is the
/// obsolete spelling of passthru.
pub fn decode_cname(zone: &ZoneInfo, targets: &[DomainName], selfname: &DomainName) -> Policy {
    let target = match targets.first() {
        Some(t) => t,
        None => return Policy::Error,
    };

    // CNAME . means NXDOMAIN
    if target.is_root() {
        return Policy::Nxdomain;
    }

    if target.is_wildcard() {
        // CNAME *. means NODATA
        if target.label_count() == 1 {
            return Policy::Nodata;
        }
        // a trigger of *.evil.example with a target of *.garden.net
        // rewrites www.evil.example to www.garden.net
        return Policy::Wildcname;
    }

    // CNAME rpz-passthru.<origin> means "do not rewrite"
    if *target == zone.passthru {
        return Policy::Passthru;
    }

    // CNAME rpz-drop.<origin> means "do not respond"
    if *target == zone.drop {
        return Policy::Drop;
    }

    // CNAME rpz-tcp-only.<origin> means "answer UDP queries with TC=1"
    if *target == zone.tcp_only {
        return Policy::TcpOnly;
    }

    // a record pointing at itself is the obsolete passthru spelling
    if target == selfname {
        return Policy::Passthru;
    }

    Policy::Record
}

/// Map a configuration string to a policy. Only the policies a zone can be
/// configured with are accepted; `no-op` is the legacy spelling of passthru;
/// anything else is `Error`.
pub fn str2policy(s: &str) -> Policy {
    if s.eq_ignore_ascii_case("no-op") {
        return Policy::Passthru;
    }
    match Policy::from_str(s) {
        // these only ever come out of decoding, never out of configuration
        Ok(Policy::Record) | Ok(Policy::Wildcname) | Ok(Policy::Error) => Policy::Error,
        Ok(p) => p,
        Err(_) => Policy::Error,
    }
}

/// The log spelling of a policy.
pub fn policy2str(policy: Policy) -> &'static str {
    match policy {
        Policy::Given => "GIVEN",
        Policy::Disabled => "DISABLED",
        Policy::Passthru => "PASSTHRU",
        Policy::Drop => "DROP",
        Policy::TcpOnly => "TCP-ONLY",
        Policy::Nxdomain => "NXDOMAIN",
        Policy::Nodata => "NODATA",
        Policy::Cname | Policy::Record | Policy::Wildcname => "Local-Data",
        Policy::Error => "ERROR",
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", policy2str(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dname;

    fn zone() -> ZoneInfo {
        ZoneInfo::new(0, dname!("policy.example"))
    }

    fn decode(target: &str) -> Policy {
        let z = zone();
        let owner = dname!("bad.evil.example.policy.example");
        decode_cname(&z, &[dname!(target)], &owner)
    }

    #[test]
    fn sentinel_targets() {
        assert_eq!(decode("."), Policy::Nxdomain);
        assert_eq!(decode("*."), Policy::Nodata);
        assert_eq!(decode("*.garden.net"), Policy::Wildcname);
        assert_eq!(decode("rpz-passthru.policy.example"), Policy::Passthru);
        assert_eq!(decode("rpz-drop.policy.example"), Policy::Drop);
        assert_eq!(decode("rpz-tcp-only.policy.example"), Policy::TcpOnly);
        assert_eq!(decode("walled.garden.net"), Policy::Record);
    }

    #[test]
    fn self_target_is_passthru() {
        let z = zone();
        let owner = dname!("32.1.0.0.127.rpz-ip.policy.example");
        assert_eq!(decode_cname(&z, &[owner.clone()], &owner), Policy::Passthru);
    }

    #[test]
    fn sentinels_of_another_zone_are_records() {
        assert_eq!(decode("rpz-passthru.other.zone"), Policy::Record);
    }

    #[test]
    fn empty_rrset_is_an_error() {
        let z = zone();
        assert_eq!(
            decode_cname(&z, &[], &dname!("x.policy.example")),
            Policy::Error
        );
    }

    #[test]
    fn policy_strings() {
        assert_eq!(str2policy("passthru"), Policy::Passthru);
        assert_eq!(str2policy("NXDOMAIN"), Policy::Nxdomain);
        assert_eq!(str2policy("tcp-only"), Policy::TcpOnly);
        assert_eq!(str2policy("No-Op"), Policy::Passthru);
        assert_eq!(str2policy("given"), Policy::Given);
        assert_eq!(str2policy("wildcname"), Policy::Error);
        assert_eq!(str2policy("bogus"), Policy::Error);

        assert_eq!(policy2str(Policy::TcpOnly), "TCP-ONLY");
        assert_eq!(policy2str(Policy::Record), "Local-Data");
        assert_eq!(Policy::Nodata.to_string(), "NODATA");
    }

    #[test]
    fn default_policy_is_given() {
        assert_eq!(Policy::default(), Policy::Given);
    }
}
