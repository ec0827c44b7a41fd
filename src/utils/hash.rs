//! Fast, non-cryptographic hashing for in-process keys.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasherDefault, Hash, Hasher};

/// A `HashMap` using the fx hash algorithm. Not resistant against adversarial
/// inputs, only ever use it for keys we build ourselves.
pub type FastHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;
/// A `HashSet` using the fx hash algorithm.
pub type FastHashSet<K> = HashSet<K, BuildHasherDefault<FxHasher>>;

/// Hashes a value with the std `DefaultHasher`.
pub fn hash<T: Hash + ?Sized>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

const SEED: u64 = 0x51_7c_c1_b7_27_22_0a_95;

/// The hash algorithm used by the Firefox codebase, very fast on short keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct FxHasher {
    hash: u64,
}

impl FxHasher {
    #[inline]
    fn add_to_hash(&mut self, i: u64) {
        self.hash = (self.hash.rotate_left(5) ^ i).wrapping_mul(SEED);
    }
}

impl Hasher for FxHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.add_to_hash(u64::from(b));
        }
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.add_to_hash(u64::from(i));
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.add_to_hash(i);
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.add_to_hash(i as u64);
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.hash
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash(&"stencil"), hash(&"stencil"));
        assert_ne!(hash(&"stencil"), hash(&"stencils"));
    }

    #[test]
    fn collections() {
        let mut map = FastHashMap::default();
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("a", 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&"a"), Some(&3));
    }
}
