use std::collections::BTreeMap;

use crate::error::RingError;

/// Virtual points contributed per live host. Higher smooths the
/// distribution of keys across hosts at the cost of a larger ring to walk.
pub const REPLICAS_PER_HOST: u32 = 40;

/// 32-bit FNV-1a. Deterministic, seedless, and fast enough to build a ring
/// of a few thousand points on every membership change — any strong
/// deterministic hash satisfies the ring's contract, this one avoids
/// pulling in an MD5 dependency for no cryptographic purpose.
fn fnv1a(s: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// A consistent-hash ring over a set of member hosts. Pure and immutable:
/// rebuild a new `HashRing` whenever membership changes rather than
/// mutating one in place.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Ring point -> owning host, ordered by point so a lookup can walk
    /// clockwise with a single `range` scan.
    points: BTreeMap<u32, String>,
}

impl HashRing {
    /// Build a ring from the given member hosts. Hosts are deduplicated;
    /// an empty member set produces a ring that always fails lookups with
    /// `NoValidHost`.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut points = BTreeMap::new();
        let mut seen = std::collections::HashSet::new();
        for host in hosts {
            let host = host.into();
            if !seen.insert(host.clone()) {
                continue;
            }
            for index in 0..REPLICAS_PER_HOST {
                let point = fnv1a(&format!("{}-{}", host, index));
                // On a hash collision between two hosts' virtual points the
                // lexicographically greater host name wins deterministically.
                points
                    .entry(point)
                    .and_modify(|existing: &mut String| {
                        if host > *existing {
                            *existing = host.clone();
                        }
                    })
                    .or_insert_with(|| host.clone());
            }
        }
        HashRing { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Map `key` to an ordered list of up to `n` distinct owning hosts,
    /// walking the ring clockwise from `hash(key)`.
    pub fn lookup(&self, key: &str, n: usize) -> Result<Vec<String>, RingError> {
        if self.points.is_empty() || n == 0 {
            return Err(RingError::NoValidHost);
        }

        let start = fnv1a(key);
        let mut owners = Vec::with_capacity(n);

        let head = self.points.range(start..).map(|(_, h)| h.clone());
        let wrap = self.points.range(..start).map(|(_, h)| h.clone());

        for host in head.chain(wrap) {
            if owners.contains(&host) {
                continue;
            }
            owners.push(host);
            if owners.len() == n {
                break;
            }
        }

        if owners.is_empty() {
            return Err(RingError::NoValidHost);
        }
        Ok(owners)
    }

    /// The single host a key is "mapped to" — the first owner in the ring.
    pub fn primary(&self, key: &str) -> Result<String, RingError> {
        self.lookup(key, 1).map(|mut v| v.remove(0))
    }
}
