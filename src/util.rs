use std::hash::BuildHasher;

pub(crate) fn constant_ahash_randomstate() -> ahash::RandomState {
    // seed pulled from the crate source
    const PI: [u64; 4] = [
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    ];
    ahash::RandomState::with_seeds(PI[0], PI[1], PI[2], PI[3])
}

#[allow(unused)]
pub(crate) fn constant_ahash_hasher() -> ahash::AHasher {
    constant_ahash_randomstate().build_hasher()
}

pub(crate) fn constant_ahash_hashmap<K, V>() -> ahash::HashMap<K, V> {
    ahash::HashMap::with_hasher(constant_ahash_randomstate())
}

pub(crate) fn constant_ahash_hashset<K>() -> ahash::HashSet<K> {
    ahash::HashSet::with_hasher(constant_ahash_randomstate())
}
