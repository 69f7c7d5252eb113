//! The trigger index proper: the zone registry, the aggregate "which zones
//! have any trigger of this kind" bitmaps, the load/ready protocol and the
//! query entry points.
//!
//! Two locks split the work. The maintenance lock serializes everything the
//! loader does; the search lock is shared by query-path readers and taken
//! exclusively only for the brief tree mutations and for the root swap that
//! publishes a reload.
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{info, warn};

use crate::cidr::CidrTree;
use crate::error::{InternalError, RPZError, RPZResult};
use crate::ipkey::{ip2owner, IpKey};
use crate::name::DomainName;
use crate::nametree::{NameBits, NameTree};
use crate::zbits::{
    check_zone_num, iter_zones, lowest_zone, mask_below, zbit, PairBits, ZBits, ZoneNum,
};
use crate::zone::{Trigger, TriggerCounts, TriggerKind, ZoneInfo};

/// Per-kind aggregates: bit `z` is set when zone `z` has at least one
/// trigger of that kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HaveBits {
    pub qname: ZBits,
    pub nsdname: ZBits,
    pub ipv4: ZBits,
    pub ipv6: ZBits,
    pub nsipv4: ZBits,
    pub nsipv6: ZBits,
    /// Zones that may decide on the query name before recursion completes,
    /// because no zone of equal or higher priority has a post-recursion
    /// trigger
    pub qname_skip_recurse: ZBits,
}

impl HaveBits {
    pub fn ip(&self) -> ZBits {
        self.ipv4 | self.ipv6
    }

    pub fn nsip(&self) -> ZBits {
        self.nsipv4 | self.nsipv6
    }
}

#[derive(Default)]
struct Trees {
    cidr: CidrTree,
    names: NameTree,
}

/// Everything the query path reads, behind the search lock.
struct SearchData {
    zones: Vec<Arc<ZoneInfo>>,
    counts: Vec<TriggerCounts>,
    trees: Trees,
    have: HaveBits,
}

struct LoadState {
    /// Zones that have been through begin at least once
    load_begun: ZBits,
}

/// A successful address lookup: the deciding zone, the trigger's owner name
/// in that zone, and the matched prefix (IPv4 prefixes unmapped back to
/// their 0..=32 range).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpMatch {
    pub zone: ZoneNum,
    pub owner: DomainName,
    pub prefix: u8,
}

/// The loader's handle for one begin/ready bracket. A first load writes
/// straight into the live trees; a reload stages into private trees that
/// `ready` publishes atomically.
pub struct LoadHandle {
    zone: ZoneNum,
    staged: Option<Trees>,
}

pub struct Rpzs {
    qname_wait_recurse: bool,
    maint: Mutex<LoadState>,
    inner: RwLock<SearchData>,
}

impl Rpzs {
    pub fn new(qname_wait_recurse: bool) -> Self {
        Rpzs {
            qname_wait_recurse,
            maint: Mutex::new(LoadState { load_begun: 0 }),
            inner: RwLock::new(SearchData {
                zones: Vec::new(),
                counts: Vec::new(),
                trees: Trees::default(),
                have: HaveBits::default(),
            }),
        }
    }

    fn maint_lock(&self) -> MutexGuard<'_, LoadState> {
        self.maint.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> RwLockReadGuard<'_, SearchData> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SearchData> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a policy zone. Ordinals are handed out in registration
    /// order, so earlier zones take priority.
    pub fn new_zone(&self, origin: DomainName) -> RPZResult<ZoneNum> {
        let _m = self.maint_lock();
        let mut inner = self.write();
        let num = check_zone_num(inner.zones.len())?;
        inner.zones.push(Arc::new(ZoneInfo::new(num, origin)));
        inner.counts.push(TriggerCounts::default());
        Ok(num)
    }

    pub fn zone(&self, num: ZoneNum) -> Option<Arc<ZoneInfo>> {
        self.read().zones.get(num as usize).cloned()
    }

    pub fn num_zones(&self) -> usize {
        self.read().zones.len()
    }

    pub fn have(&self) -> HaveBits {
        self.read().have
    }

    pub fn counts(&self, num: ZoneNum) -> Option<TriggerCounts> {
        self.read().counts.get(num as usize).copied()
    }

    /// Open a load bracket for one zone. The very first load of a zone gets
    /// the cheap path: records are written directly into the live trees.
    /// Every later load is staged and only becomes visible at `ready`.
    pub fn begin(&self, num: ZoneNum) -> RPZResult<LoadHandle> {
        let mut st = self.maint_lock();
        if self.read().zones.get(num as usize).is_none() {
            return Err(RPZError::NotFound);
        }

        if st.load_begun & zbit(num) == 0 {
            st.load_begun |= zbit(num);
            Ok(LoadHandle { zone: num, staged: None })
        } else {
            Ok(LoadHandle {
                zone: num,
                staged: Some(Trees::default()),
            })
        }
    }

    /// Record one trigger owner name. Malformed owners and duplicates are
    /// logged and swallowed so a bad record cannot abort a zone load.
    pub fn add(&self, handle: &mut LoadHandle, owner: &DomainName) -> RPZResult<()> {
        let _m = self.maint_lock();
        let num = handle.zone;
        let zone = self.zone(num).ok_or(RPZError::NotFound)?;

        let trigger = match zone.classify(owner) {
            Ok(t) => t,
            Err(e) => {
                warn!("ignoring invalid rpz trigger {}: {:?}", owner, e);
                return Ok(());
            }
        };

        match handle.staged.as_mut() {
            Some(trees) => match apply_add(trees, &trigger, num) {
                Err(RPZError::AlreadyExists) => {
                    warn!("ignoring duplicate rpz trigger {}", owner);
                    Ok(())
                }
                other => other,
            },
            None => {
                let mut inner = self.write();
                match apply_add(&mut inner.trees, &trigger, num) {
                    Ok(()) => {
                        adjust_count(&mut inner, num, &trigger, true);
                        fix_have(&mut inner, self.qname_wait_recurse);
                        Ok(())
                    }
                    Err(RPZError::AlreadyExists) => {
                        warn!("ignoring duplicate rpz trigger {}", owner);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Remove one trigger owner name. Names that are malformed or not
    /// present are ignored, matching the add path.
    pub fn delete(&self, handle: &mut LoadHandle, owner: &DomainName) -> RPZResult<()> {
        let _m = self.maint_lock();
        let num = handle.zone;
        let zone = self.zone(num).ok_or(RPZError::NotFound)?;

        let trigger = match zone.classify(owner) {
            Ok(t) => t,
            Err(e) => {
                warn!("ignoring invalid rpz trigger {}: {:?}", owner, e);
                return Ok(());
            }
        };

        match handle.staged.as_mut() {
            Some(trees) => {
                apply_delete(trees, &trigger, num);
            }
            None => {
                let mut inner = self.write();
                if apply_delete(&mut inner.trees, &trigger, num) {
                    adjust_count(&mut inner, num, &trigger, false);
                    fix_have(&mut inner, self.qname_wait_recurse);
                }
            }
        }
        Ok(())
    }

    /// Close a load bracket. For a staged reload this copies every other
    /// zone's entries from the live trees into the staged ones, then swaps
    /// the tree roots under the exclusive search lock: a reader sees the
    /// whole old index or the whole new one, never a mix.
    pub fn ready(&self, handle: LoadHandle) -> RPZResult<()> {
        let _m = self.maint_lock();
        let num = handle.zone;
        let origin = self.zone(num).ok_or(RPZError::NotFound)?.origin.clone();

        let mut staged = match handle.staged {
            None => {
                // first load went straight into the live trees; settle the
                // counters and aggregates from what actually landed
                let mut inner = self.write();
                recompute_counts(&mut inner);
                fix_have(&mut inner, self.qname_wait_recurse);
                info!(
                    "rpz zone {} loaded: {}",
                    origin, inner.counts[num as usize]
                );
                return Ok(());
            }
            Some(staged) => staged,
        };

        let before = {
            let inner = self.read();
            let mut copy_failed = false;

            inner.trees.cidr.walk(&mut |key, prefix, pair| {
                let keep = pair.without_zone(num);
                if !keep.is_empty() && staged.cidr.add(key, prefix, &keep).is_err() {
                    copy_failed = true;
                }
            });
            inner.trees.names.walk(&mut |name, bits| {
                let keep = bits.without_zone(num);
                if !keep.is_empty() && staged.names.add(name, &keep).is_err() {
                    copy_failed = true;
                }
            });

            if copy_failed {
                // disjoint per-zone bits cannot collide during a copy
                return Err(RPZError::from(InternalError::CorruptedTree));
            }
            inner.counts[num as usize]
        };

        let mut inner = self.write();
        std::mem::swap(&mut inner.trees, &mut staged);
        recompute_counts(&mut inner);
        fix_have(&mut inner, self.qname_wait_recurse);
        info!(
            "rpz zone {} reloaded: {} (was {})",
            origin, inner.counts[num as usize], before
        );
        Ok(())
    }

    /// Longest-prefix, first-zone match of an address against the answer-IP
    /// (`Ip`) or nameserver-IP (`Nsip`) triggers.
    pub fn find_ip(&self, kind: TriggerKind, zbits: ZBits, addr: &IpAddr) -> Option<IpMatch> {
        let inner = self.read();

        let v4 = matches!(addr, IpAddr::V4(_));
        let zbits = zbits
            & match (kind, v4) {
                (TriggerKind::Ip, true) => inner.have.ipv4,
                (TriggerKind::Ip, false) => inner.have.ipv6,
                (TriggerKind::Nsip, true) => inner.have.nsipv4,
                (TriggerKind::Nsip, false) => inner.have.nsipv6,
                _ => return None,
            };
        if zbits == 0 {
            return None;
        }

        let key = IpKey::from_addr(addr);
        let tgt = match kind {
            TriggerKind::Ip => PairBits::new(zbits, 0),
            _ => PairBits::new(0, zbits),
        };
        let hit = inner.trees.cidr.lookup(&key, &tgt)?;

        let found = match kind {
            TriggerKind::Ip => hit.pair.d,
            _ => hit.pair.ns,
        } & zbits;
        let zone = lowest_zone(found)?;

        let zinfo = &inner.zones[zone as usize];
        let base = match kind {
            TriggerKind::Ip => &zinfo.ip_base,
            _ => &zinfo.nsip_base,
        };
        let prefix = if hit.ip.is_ipv4(hit.prefix) {
            hit.prefix - 96
        } else {
            hit.prefix
        };

        Some(IpMatch {
            zone,
            owner: ip2owner(&hit.ip, hit.prefix, base),
            prefix,
        })
    }

    /// All zones with a qname or nsdname trigger covering `name`, as a bit
    /// set: the exact owner's bits plus every ancestor's wildcard bits,
    /// restricted to the caller's candidate zones.
    pub fn find_name(&self, kind: TriggerKind, zbits: ZBits, name: &DomainName) -> ZBits {
        if zbits == 0 {
            return 0;
        }
        let inner = self.read();

        let tgt = match kind {
            TriggerKind::Qname => PairBits::new(zbits, 0),
            TriggerKind::Nsdname => PairBits::new(0, zbits),
            _ => return 0,
        };
        let found = inner.trees.names.find(name, &tgt);
        match kind {
            TriggerKind::Qname => found.d,
            _ => found.ns,
        }
    }
}

fn apply_add(trees: &mut Trees, trigger: &Trigger, num: ZoneNum) -> RPZResult<()> {
    match trigger {
        Trigger::Ip { key, prefix } => {
            trees.cidr.add(key, *prefix, &PairBits::new(zbit(num), 0))
        }
        Trigger::Nsip { key, prefix } => {
            trees.cidr.add(key, *prefix, &PairBits::new(0, zbit(num)))
        }
        Trigger::Qname { name, wild } => {
            trees.names.add(name, &name_bits(zbit(num), 0, *wild))
        }
        Trigger::Nsdname { name, wild } => {
            trees.names.add(name, &name_bits(0, zbit(num), *wild))
        }
    }
}

fn apply_delete(trees: &mut Trees, trigger: &Trigger, num: ZoneNum) -> bool {
    match trigger {
        Trigger::Ip { key, prefix } => {
            trees.cidr.delete(key, *prefix, &PairBits::new(zbit(num), 0))
        }
        Trigger::Nsip { key, prefix } => {
            trees.cidr.delete(key, *prefix, &PairBits::new(0, zbit(num)))
        }
        Trigger::Qname { name, wild } => {
            trees.names.delete(name, &name_bits(zbit(num), 0, *wild))
        }
        Trigger::Nsdname { name, wild } => {
            trees.names.delete(name, &name_bits(0, zbit(num), *wild))
        }
    }
}

fn name_bits(d: ZBits, ns: ZBits, wild: bool) -> NameBits {
    let pair = PairBits::new(d, ns);
    if wild {
        NameBits {
            wild: pair,
            ..Default::default()
        }
    } else {
        NameBits {
            pair,
            ..Default::default()
        }
    }
}

fn adjust_count(data: &mut SearchData, num: ZoneNum, trigger: &Trigger, up: bool) {
    let counts = &mut data.counts[num as usize];
    let slot = match trigger {
        Trigger::Qname { .. } => &mut counts.qname,
        Trigger::Nsdname { .. } => &mut counts.nsdname,
        Trigger::Ip { key, prefix } => {
            if key.is_ipv4(*prefix) {
                &mut counts.ipv4
            } else {
                &mut counts.ipv6
            }
        }
        Trigger::Nsip { key, prefix } => {
            if key.is_ipv4(*prefix) {
                &mut counts.nsipv4
            } else {
                &mut counts.nsipv6
            }
        }
    };
    if up {
        *slot += 1;
    } else {
        *slot = slot.saturating_sub(1);
    }
}

/// Rebuild every zone's counters by walking both trees, as `ready` does
/// instead of trusting incremental adjustments across a reload.
fn recompute_counts(data: &mut SearchData) {
    let mut counts = vec![TriggerCounts::default(); data.zones.len()];

    data.trees.cidr.walk(&mut |key, prefix, pair| {
        let v4 = key.is_ipv4(prefix);
        for z in iter_zones(pair.d) {
            if v4 {
                counts[z as usize].ipv4 += 1;
            } else {
                counts[z as usize].ipv6 += 1;
            }
        }
        for z in iter_zones(pair.ns) {
            if v4 {
                counts[z as usize].nsipv4 += 1;
            } else {
                counts[z as usize].nsipv6 += 1;
            }
        }
    });

    data.trees.names.walk(&mut |_, bits| {
        for z in iter_zones(bits.pair.d) {
            counts[z as usize].qname += 1;
        }
        for z in iter_zones(bits.wild.d) {
            counts[z as usize].qname += 1;
        }
        for z in iter_zones(bits.pair.ns) {
            counts[z as usize].nsdname += 1;
        }
        for z in iter_zones(bits.wild.ns) {
            counts[z as usize].nsdname += 1;
        }
    });

    data.counts = counts;
}

/// Refresh the aggregates from the counters. The skip-recurse mask covers
/// the zones strictly above the first zone owning any post-recursion
/// trigger (address, nsdname or nsip); those zones can safely rewrite on
/// qname alone.
fn fix_have(data: &mut SearchData, qname_wait_recurse: bool) {
    let mut have = HaveBits::default();
    for (i, c) in data.counts.iter().enumerate() {
        let bit = zbit(i as ZoneNum);
        if c.qname > 0 {
            have.qname |= bit;
        }
        if c.nsdname > 0 {
            have.nsdname |= bit;
        }
        if c.ipv4 > 0 {
            have.ipv4 |= bit;
        }
        if c.ipv6 > 0 {
            have.ipv6 |= bit;
        }
        if c.nsipv4 > 0 {
            have.nsipv4 |= bit;
        }
        if c.nsipv6 > 0 {
            have.nsipv6 |= bit;
        }
    }

    have.qname_skip_recurse = if qname_wait_recurse {
        0
    } else {
        let post_recursion = have.ip() | have.nsdname | have.nsip();
        match lowest_zone(post_recursion) {
            Some(z) => mask_below(z),
            None => ZBits::MAX,
        }
    };

    data.have = have;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zbits::MAX_ZONES;
    use crate::{dname, ipaddr, zone_set};

    fn load(rpzs: &Rpzs, num: ZoneNum, owners: &[&str]) {
        let mut handle = rpzs.begin(num).unwrap();
        for owner in owners {
            rpzs.add(&mut handle, &dname!(*owner)).unwrap();
        }
        rpzs.ready(handle).unwrap();
    }

    fn two_zones() -> Rpzs {
        let rpzs = Rpzs::new(false);
        rpzs.new_zone(dname!("first.policy")).unwrap();
        rpzs.new_zone(dname!("second.policy")).unwrap();
        rpzs
    }

    #[test]
    fn ipv4_longest_match() {
        let rpzs = two_zones();
        load(
            &rpzs,
            0,
            &[
                "24.0.0.0.10.rpz-ip.first.policy",
                "32.1.1.1.10.rpz-ip.first.policy",
            ],
        );

        let hit = rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.1.1.1"))
            .unwrap();
        assert_eq!(hit.zone, 0);
        assert_eq!(hit.prefix, 32);
        assert_eq!(hit.owner.to_string(), "32.1.1.1.10.rpz-ip.first.policy.");

        let hit = rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.0.0.5"))
            .unwrap();
        assert_eq!(hit.zone, 0);
        assert_eq!(hit.prefix, 24);
        assert_eq!(hit.owner.to_string(), "24.0.0.0.10.rpz-ip.first.policy.");

        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.2.0.1"))
            .is_none());
    }

    #[test]
    fn first_zone_wins_regardless_of_load_order() {
        let rpzs = two_zones();
        load(&rpzs, 1, &["32.1.1.1.10.rpz-ip.second.policy"]);
        load(&rpzs, 0, &["32.1.1.1.10.rpz-ip.first.policy"]);

        let hit = rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.1.1.1"))
            .unwrap();
        assert_eq!(hit.zone, 0);
        assert_eq!(hit.owner.to_string(), "32.1.1.1.10.rpz-ip.first.policy.");

        // with zone 0 excluded, zone 1 decides
        let hit = rpzs
            .find_ip(TriggerKind::Ip, zone_set!(1), &ipaddr!("10.1.1.1"))
            .unwrap();
        assert_eq!(hit.zone, 1);
    }

    #[test]
    fn first_zone_beats_longer_prefix_of_later_zone() {
        let rpzs = two_zones();
        load(&rpzs, 0, &["24.0.0.10.10.rpz-ip.first.policy"]);
        load(&rpzs, 1, &["32.7.0.10.10.rpz-ip.second.policy"]);

        let hit = rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.10.0.7"))
            .unwrap();
        assert_eq!(hit.zone, 0);
        assert_eq!(hit.prefix, 24);
    }

    #[test]
    fn ipv6_trigger_with_zz() {
        let rpzs = two_zones();
        load(&rpzs, 0, &["48.zz.1.2.2001.rpz-ip.first.policy"]);

        let hit = rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0), &ipaddr!("2001:2:1::42"))
            .unwrap();
        assert_eq!(hit.prefix, 48);
        assert_eq!(hit.owner.to_string(), "48.zz.1.2.2001.rpz-ip.first.policy.");

        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0), &ipaddr!("2001:3:1::42"))
            .is_none());
    }

    #[test]
    fn non_canonical_ipv6_trigger_is_ignored() {
        let rpzs = two_zones();
        // spelled-out zero run instead of zz: rejected, load goes on
        load(
            &rpzs,
            0,
            &[
                "48.0.0.0.0.0.1.2.2001.rpz-ip.first.policy",
                "32.1.1.1.10.rpz-ip.first.policy",
            ],
        );

        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0), &ipaddr!("2001:2:1::42"))
            .is_none());
        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0), &ipaddr!("10.1.1.1"))
            .is_some());
        let counts = rpzs.counts(0).unwrap();
        assert_eq!(counts.ipv4, 1);
        assert_eq!(counts.ipv6, 0);
    }

    #[test]
    fn wildcard_qname() {
        let rpzs = two_zones();
        load(&rpzs, 1, &["*.evil.example.second.policy"]);

        let found = rpzs.find_name(
            TriggerKind::Qname,
            zone_set!(0, 1),
            &dname!("foo.evil.example"),
        );
        assert_eq!(found, zone_set!(1));

        // the wildcard does not cover the bare name
        let found = rpzs.find_name(TriggerKind::Qname, zone_set!(0, 1), &dname!("evil.example"));
        assert_eq!(found, 0);
    }

    #[test]
    fn nsdname_and_qname_do_not_leak_into_each_other() {
        let rpzs = two_zones();
        load(
            &rpzs,
            0,
            &[
                "bad.example.first.policy",
                "ns.bad.example.rpz-nsdname.first.policy",
            ],
        );

        assert_eq!(
            rpzs.find_name(TriggerKind::Qname, ZBits::MAX, &dname!("bad.example")),
            zone_set!(0)
        );
        assert_eq!(
            rpzs.find_name(TriggerKind::Nsdname, ZBits::MAX, &dname!("bad.example")),
            0
        );
        assert_eq!(
            rpzs.find_name(TriggerKind::Nsdname, ZBits::MAX, &dname!("ns.bad.example")),
            zone_set!(0)
        );
    }

    #[test]
    fn nsip_lookup_uses_the_ns_bits() {
        let rpzs = two_zones();
        load(&rpzs, 0, &["32.53.0.0.192.rpz-nsip.first.policy"]);

        let hit = rpzs
            .find_ip(TriggerKind::Nsip, zone_set!(0), &ipaddr!("192.0.0.53"))
            .unwrap();
        assert_eq!(hit.owner.to_string(), "32.53.0.0.192.rpz-nsip.first.policy.");

        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0), &ipaddr!("192.0.0.53"))
            .is_none());
    }

    #[test]
    fn counters_and_have_bits() {
        let rpzs = two_zones();
        load(
            &rpzs,
            0,
            &[
                "bad.example.first.policy",
                "*.bad.example.first.policy",
                "32.1.1.1.10.rpz-ip.first.policy",
                "48.zz.1.2.2001.rpz-ip.first.policy",
                "ns.bad.example.rpz-nsdname.first.policy",
                "128.zz.53.rpz-nsip.first.policy",
            ],
        );

        let counts = rpzs.counts(0).unwrap();
        assert_eq!(counts.qname, 2);
        assert_eq!(counts.nsdname, 1);
        assert_eq!(counts.ipv4, 1);
        assert_eq!(counts.ipv6, 1);
        assert_eq!(counts.nsipv4, 0);
        assert_eq!(counts.nsipv6, 1);

        let have = rpzs.have();
        assert_eq!(have.qname, zone_set!(0));
        assert_eq!(have.ip(), zone_set!(0));
        assert_eq!(have.nsip(), zone_set!(0));
        assert_eq!(have.ipv4, zone_set!(0));
        assert_eq!(have.nsipv4, 0);
    }

    #[test]
    fn qname_skip_recurse_mask() {
        // zone 0 has only qname triggers, zone 1 has an address trigger:
        // only zone 0 may rewrite before recursion
        let rpzs = two_zones();
        load(&rpzs, 0, &["bad.example.first.policy"]);
        load(&rpzs, 1, &["32.1.1.1.10.rpz-ip.second.policy"]);
        assert_eq!(rpzs.have().qname_skip_recurse, mask_below(1));

        // no post-recursion triggers anywhere: every zone may
        let rpzs = two_zones();
        load(&rpzs, 0, &["bad.example.first.policy"]);
        assert_eq!(rpzs.have().qname_skip_recurse, ZBits::MAX);

        // qname-wait-recurse forces everyone to wait
        let rpzs = Rpzs::new(true);
        rpzs.new_zone(dname!("first.policy")).unwrap();
        load(&rpzs, 0, &["bad.example.first.policy"]);
        assert_eq!(rpzs.have().qname_skip_recurse, 0);
    }

    #[test]
    fn deletes_update_counters() {
        let rpzs = two_zones();
        let mut handle = rpzs.begin(0).unwrap();
        rpzs.add(&mut handle, &dname!("32.1.1.1.10.rpz-ip.first.policy"))
            .unwrap();
        rpzs.add(&mut handle, &dname!("bad.example.first.policy"))
            .unwrap();
        rpzs.delete(&mut handle, &dname!("32.1.1.1.10.rpz-ip.first.policy"))
            .unwrap();
        // deleting what was never there changes nothing
        rpzs.delete(&mut handle, &dname!("32.2.2.2.10.rpz-ip.first.policy"))
            .unwrap();
        rpzs.ready(handle).unwrap();

        let counts = rpzs.counts(0).unwrap();
        assert_eq!(counts.ipv4, 0);
        assert_eq!(counts.qname, 1);
        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0), &ipaddr!("10.1.1.1"))
            .is_none());
    }

    #[test]
    fn reload_preserves_other_zones() {
        let rpzs = two_zones();
        load(
            &rpzs,
            0,
            &[
                "old.example.first.policy",
                "32.1.1.1.10.rpz-ip.first.policy",
            ],
        );
        load(&rpzs, 1, &["32.2.2.2.10.rpz-ip.second.policy"]);

        // reload zone 0 with a completely different trigger set
        let mut handle = rpzs.begin(0).unwrap();
        rpzs.add(&mut handle, &dname!("new.example.first.policy"))
            .unwrap();
        rpzs.add(&mut handle, &dname!("32.9.9.9.10.rpz-ip.first.policy"))
            .unwrap();
        rpzs.ready(handle).unwrap();

        // zone 1 is untouched
        let hit = rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.2.2.2"))
            .unwrap();
        assert_eq!(hit.zone, 1);

        // zone 0's old triggers are gone, the new ones answer
        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.1.1.1"))
            .is_none());
        assert_eq!(
            rpzs.find_name(TriggerKind::Qname, ZBits::MAX, &dname!("old.example")),
            0
        );
        assert!(rpzs
            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.9.9.9"))
            .is_some());
        assert_eq!(
            rpzs.find_name(TriggerKind::Qname, ZBits::MAX, &dname!("new.example")),
            zone_set!(0)
        );

        let counts = rpzs.counts(0).unwrap();
        assert_eq!((counts.qname, counts.ipv4), (1, 1));
    }

    #[test]
    fn readers_always_see_a_complete_index() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let rpzs = two_zones();
        load(&rpzs, 0, &["32.1.1.1.10.rpz-ip.first.policy"]);
        load(&rpzs, 1, &["32.2.2.2.10.rpz-ip.second.policy"]);

        let stop = AtomicBool::new(false);
        std::thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|| {
                    while !stop.load(Ordering::Relaxed) {
                        // zone 1 is never the zone being reloaded, so its
                        // trigger must be visible in every snapshot
                        let hit = rpzs
                            .find_ip(TriggerKind::Ip, zone_set!(0, 1), &ipaddr!("10.2.2.2"))
                            .expect("zone 1 trigger vanished during a reload");
                        assert_eq!(hit.zone, 1);
                    }
                });
            }

            for i in 0..50 {
                let owner = if i % 2 == 0 {
                    "32.9.9.9.10.rpz-ip.first.policy"
                } else {
                    "32.1.1.1.10.rpz-ip.first.policy"
                };
                let mut handle = rpzs.begin(0).unwrap();
                rpzs.add(&mut handle, &dname!(owner)).unwrap();
                rpzs.ready(handle).unwrap();
            }
            stop.store(true, Ordering::Relaxed);
        });
    }

    #[test]
    fn zone_limit_is_enforced() {
        let rpzs = Rpzs::new(false);
        for i in 0..MAX_ZONES {
            rpzs.new_zone(dname!(format!("zone{}.policy", i).as_str()))
                .unwrap();
        }
        assert!(matches!(
            rpzs.new_zone(dname!("onetoomany.policy")),
            Err(RPZError::TooManyZones)
        ));
    }

    #[test]
    fn begin_rejects_unknown_zones() {
        let rpzs = Rpzs::new(false);
        assert!(matches!(rpzs.begin(0), Err(RPZError::NotFound)));
    }
}
