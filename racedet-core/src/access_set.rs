use crate::address::Address;
use fxhash::FxHashSet;

/// A set of [`Address`]es written (or read) by a strand.
///
/// Backed by an `FxHashSet`, which trades cryptographic hash strength we
/// don't need for the speed this hot path does: `union_into` and
/// `intersect` are called on every `join` and `enter_serial`.
#[derive(Clone, Debug, Default)]
pub struct AccessSet {
    addrs: FxHashSet<Address>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self {
            addrs: FxHashSet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn insert(&mut self, addr: Address) {
        self.addrs.insert(addr);
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.addrs.contains(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.addrs.iter()
    }

    /// Erase every address in `[low, high)`. Used to strip stack-local
    /// addresses from a frame's `SW` on function exit.
    pub fn retain_outside(&mut self, low: Address, high: Address) {
        self.addrs.retain(|a| !(low <= *a && *a < high));
    }

    /// Move the contents of `src` into `dst`, always scanning the smaller
    /// of the two sets. `src` is left empty: callers should treat it as
    /// moved-from.
    pub fn union_into(dst: &mut AccessSet, src: &mut AccessSet) {
        if src.addrs.len() > dst.addrs.len() {
            std::mem::swap(dst, src);
        }
        for addr in src.addrs.drain() {
            dst.addrs.insert(addr);
        }
    }

    /// Append every address common to `a` and `b` to `witness`, iterating
    /// whichever of the two is smaller.
    pub fn intersect(a: &AccessSet, b: &AccessSet, witness: &mut Vec<Address>) {
        let (small, large) = if a.addrs.len() <= b.addrs.len() {
            (a, b)
        } else {
            (b, a)
        };
        for addr in &small.addrs {
            if large.addrs.contains(addr) {
                witness.push(*addr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(addrs: &[u64]) -> AccessSet {
        let mut s = AccessSet::new();
        for a in addrs {
            s.insert(Address::new(*a));
        }
        s
    }

    #[test]
    fn insert_is_idempotent() {
        let mut s = AccessSet::new();
        s.insert(Address::new(1));
        s.insert(Address::new(1));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn union_into_combines_both_originals() {
        let mut dst = set(&[1, 2, 3]);
        let mut src = set(&[3, 4]);
        AccessSet::union_into(&mut dst, &mut src);
        assert!(src.is_empty());
        for a in [1, 2, 3, 4] {
            assert!(dst.contains(Address::new(a)));
        }
        assert_eq!(dst.len(), 4);
    }

    #[test]
    fn union_into_scans_the_smaller_side() {
        // dst smaller than src: the implementation must swap so the scan
        // (the `drain` loop) iterates `src`'s original contents, not
        // `dst`'s. Observable only via behavior, not instrumentation, so
        // we just assert correctness under both size orderings.
        let mut dst = set(&[1]);
        let mut src = set(&[2, 3, 4, 5]);
        AccessSet::union_into(&mut dst, &mut src);
        assert_eq!(dst.len(), 5);
        assert!(src.is_empty());
    }

    #[test]
    fn intersect_finds_common_elements_regardless_of_order() {
        let a = set(&[1, 2, 3]);
        let b = set(&[2, 3, 4]);
        let mut witness = Vec::new();
        AccessSet::intersect(&a, &b, &mut witness);
        witness.sort();
        assert_eq!(witness, vec![Address::new(2), Address::new(3)]);

        let mut witness2 = Vec::new();
        AccessSet::intersect(&b, &a, &mut witness2);
        witness2.sort();
        assert_eq!(witness, witness2);
    }

    #[test]
    fn intersect_of_disjoint_sets_is_empty() {
        let a = set(&[1, 2]);
        let b = set(&[3, 4]);
        let mut witness = Vec::new();
        AccessSet::intersect(&a, &b, &mut witness);
        assert!(witness.is_empty());
    }

    #[test]
    fn retain_outside_erases_a_range() {
        let mut s = set(&[0x1000, 0x1008, 0x1010, 0x2000]);
        s.retain_outside(Address::new(0x1000), Address::new(0x1010));
        assert!(!s.contains(Address::new(0x1000)));
        assert!(!s.contains(Address::new(0x1008)));
        assert!(s.contains(Address::new(0x1010)));
        assert!(s.contains(Address::new(0x2000)));
    }
}
