//! The IP key codec. Address triggers live in policy zones as owner names of
//! the form `<prefix>.<oct0>.<oct1>.<oct2>.<oct3>` (IPv4, low octet first) or
//! `<prefix>.<word>...` (IPv6, hex 16-bit words, low word first, one `zz`
//! label standing for a run of zero words). This module converts those label
//! sequences to a 128-bit key and back, rejecting every spelling that does
//! not round-trip to the same labels.
use std::io::Cursor;
use std::net::IpAddr;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{RPZError, RPZResult};
use crate::name::DomainName;

pub const KEY_BITS: u8 = 128;
const WORD_BITS: u8 = 32;
const WORDS: usize = 4;

/// The three high words of a v4-mapped key.
const ADDR_V4MAPPED: u32 = 0xffff;

/// A 128-bit address key: four host-endian 32-bit words, big end first.
/// IPv4 addresses are canonicalized to the v4-mapped form
/// `[0, 0, 0xffff, v4]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IpKey {
    pub w: [u32; WORDS],
}

/// Mask keeping the top `b` bits of a word.
#[inline]
fn word_mask(b: u8) -> u32 {
    if b == 0 {
        u32::MAX
    } else {
        u32::MAX << (WORD_BITS - b)
    }
}

impl IpKey {
    /// Build a key from a resolver-side address; always 128 significant bits.
    /// This is the only place network byte order enters the index.
    pub fn from_addr(addr: &IpAddr) -> IpKey {
        let octets: Vec<u8> = match addr {
            IpAddr::V4(v4) => {
                let mut v = vec![0u8; 10];
                v.extend_from_slice(&[0xff, 0xff]);
                v.extend_from_slice(&v4.octets());
                v
            }
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };

        let mut cursor = Cursor::new(octets.as_slice());
        let mut w = [0u32; WORDS];
        for word in w.iter_mut() {
            // cannot fail: the slice is always 16 bytes
            *word = cursor.read_u32::<BigEndian>().unwrap_or(0);
        }

        IpKey { w }
    }

    /// An IPv4 key is a v4-mapped key whose prefix covers the mapping words.
    pub fn is_ipv4(&self, prefix: u8) -> bool {
        prefix >= 96 && self.w[0] == 0 && self.w[1] == 0 && self.w[2] == ADDR_V4MAPPED
    }

    /// The bit at 0-indexed position `bitno`, counting from the big end.
    #[inline]
    pub fn bit(&self, bitno: u8) -> usize {
        (1 & (self.w[bitno as usize / 32] >> (31 - (bitno % 32)))) as usize
    }

    /// The key with every bit past `prefix` cleared.
    pub fn masked(&self, prefix: u8) -> IpKey {
        let mut out = IpKey::default();
        let words = (prefix / WORD_BITS) as usize;
        let wlen = prefix % WORD_BITS;

        out.w[..words].copy_from_slice(&self.w[..words]);
        if wlen != 0 {
            out.w[words] = self.w[words] & word_mask(wlen);
        }
        out
    }

    /// True when any bit past `prefix` is set.
    pub fn has_bits_past(&self, prefix: u8) -> bool {
        *self != self.masked(prefix)
    }

    /// The 16-bit word at index `k`, 0 being the least significant.
    #[inline]
    fn halfword(&self, k: usize) -> u16 {
        let w = self.w[3 - k / 2];
        if k % 2 == 0 {
            w as u16
        } else {
            (w >> 16) as u16
        }
    }

    #[inline]
    fn set_halfword(&mut self, k: usize, v: u16) {
        let w = &mut self.w[3 - k / 2];
        if k % 2 == 0 {
            *w = (*w & 0xffff_0000) | v as u32;
        } else {
            *w = (*w & 0x0000_ffff) | ((v as u32) << 16);
        }
    }
}

/// Number of leading bits two prefix-masked keys have in common, capped at
/// the shorter of the two prefixes.
pub fn diff_keys(key1: &IpKey, prefix1: u8, key2: &IpKey, prefix2: u8) -> u8 {
    let maxbit = prefix1.min(prefix2);
    let mut bit = 0u8;

    for i in 0..WORDS {
        if bit >= maxbit {
            break;
        }
        let delta = key1.w[i] ^ key2.w[i];
        if delta != 0 {
            bit += delta.leading_zeros() as u8;
            return bit.min(maxbit);
        }
        bit += WORD_BITS;
    }
    bit.min(maxbit)
}

/// Decode the leading labels of a trigger owner name into `(key, prefix)`.
/// `labels` holds only the address part, owner order: the prefix label
/// first, then the address labels with the low-order part first.
pub fn name2ipkey(labels: &[String]) -> RPZResult<(IpKey, u8)> {
    let text = || labels.join(".");

    // at least the prefix and one address label
    if labels.len() < 2 {
        return Err(RPZError::bad_name(&text(), "too short"));
    }

    let prefix_num: u32 = labels[0]
        .parse()
        .map_err(|_| RPZError::bad_name(&text(), "invalid leading prefix length"))?;
    if !(1..=128).contains(&prefix_num) {
        return Err(RPZError::bad_name(&text(), "invalid prefix length"));
    }

    let addr_labels = &labels[1..];
    let mut key = IpKey::default();
    let prefix;

    if addr_labels.len() == 4 && !addr_labels.iter().any(|l| l.contains('z')) {
        // IPv4, "prefix.z.y.x.w" with the low octet first
        if prefix_num > 32 {
            return Err(RPZError::bad_name(&text(), "invalid prefix length"));
        }
        prefix = prefix_num as u8 + 96;
        key.w[2] = ADDR_V4MAPPED;
        for (i, label) in addr_labels.iter().enumerate() {
            let octet: u32 = label
                .parse()
                .map_err(|_| RPZError::bad_name(&text(), "invalid IPv4 octet"))?;
            if octet > 255 {
                return Err(RPZError::bad_name(&text(), "invalid IPv4 octet"));
            }
            key.w[3] |= octet << (8 * i);
        }
    } else {
        // IPv6, hex 16-bit words with the low word first and at most one
        // `zz` label standing for a run of zero words
        prefix = prefix_num as u8;

        let mut words: Vec<u16> = Vec::with_capacity(8);
        let mut zz_at: Option<usize> = None;
        for label in addr_labels {
            if label == "zz" {
                if zz_at.is_some() {
                    return Err(RPZError::bad_name(&text(), "more than one zz label"));
                }
                zz_at = Some(words.len());
            } else {
                let word = u32::from_str_radix(label, 16)
                    .map_err(|_| RPZError::bad_name(&text(), "invalid IPv6 word"))?;
                if word > 0xffff {
                    return Err(RPZError::bad_name(&text(), "invalid IPv6 word"));
                }
                words.push(word as u16);
            }
        }

        match zz_at {
            Some(pos) => {
                if words.len() >= 8 {
                    return Err(RPZError::bad_name(&text(), "too many IPv6 words"));
                }
                let run = 8 - words.len();
                words.splice(pos..pos, std::iter::repeat(0).take(run));
            }
            None => {
                if words.len() != 8 {
                    return Err(RPZError::bad_name(&text(), "wrong number of IPv6 words"));
                }
            }
        }

        for (k, word) in words.iter().enumerate() {
            key.set_halfword(k, *word);
        }
    }

    // every bit past the prefix must be zero
    if key.has_bits_past(prefix) {
        return Err(RPZError::bad_name(&text(), "too small prefix length"));
    }

    // the name must be spelled exactly the way the encoder spells this key
    if ip2name(&key, prefix) != labels {
        return Err(RPZError::bad_name(&text(), "not canonical"));
    }

    Ok((key, prefix))
}

/// Encode `(key, prefix)` as trigger owner labels, the reverse of
/// [`name2ipkey`]. The `zz` label stands for the first run of two or more
/// zero words met going up from the low end.
pub fn ip2name(key: &IpKey, prefix: u8) -> Vec<String> {
    let mut labels = Vec::with_capacity(9);

    if key.is_ipv4(prefix) {
        labels.push(format!("{}", prefix - 96));
        for i in 0..4 {
            labels.push(format!("{}", (key.w[3] >> (8 * i)) & 0xff));
        }
    } else {
        labels.push(format!("{}", prefix));
        let mut zz_done = false;
        let mut k = 0usize;
        while k < 8 {
            if !zz_done && key.halfword(k) == 0 && k < 7 && key.halfword(k + 1) == 0 {
                while k < 8 && key.halfword(k) == 0 {
                    k += 1;
                }
                zz_done = true;
                labels.push(String::from("zz"));
            } else {
                labels.push(format!("{:x}", key.halfword(k)));
                k += 1;
            }
        }
    }

    labels
}

/// The owner labels joined into a domain name below `base`, as published in
/// a policy zone: `<address labels>.<marker>.<origin>`.
pub fn ip2owner(key: &IpKey, prefix: u8, base: &DomainName) -> DomainName {
    DomainName::from_labels(ip2name(key, prefix)).concat(base)
}
