//! Provide `FixedHasher`, a `foldhash` hasher with a fixed seed.

use core::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

// -----------------------------------------------------------------------------
// FixedHasher

const FIXED_HASH_STATE: FixedState = FixedState::with_seed(0x2C5E_7A91_D04B_63F1);

/// A hasher whose results only depend on the input.
///
/// Alias of [`foldhash::fast::FoldHasher`], created through
/// [`FixedHashState::build_hasher`].
pub type FixedHasher = FoldHasher<'static>;

/// Hash state with a fixed seed.
///
/// # Examples
///
/// ```
/// use core::hash::{BuildHasher, Hash, Hasher};
/// use crs_utils::hash::FixedHashState;
///
/// let hash = |value: &str| {
///     let mut hasher = FixedHashState.build_hasher();
///     value.hash(&mut hasher);
///     hasher.finish()
/// };
///
/// assert_eq!(hash("Person"), hash("Person"));
/// ```
#[derive(Copy, Clone, Default, Debug)]
pub struct FixedHashState;

impl BuildHasher for FixedHashState {
    type Hasher = FixedHasher;

    #[inline(always)]
    fn build_hasher(&self) -> Self::Hasher {
        FIXED_HASH_STATE.build_hasher()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use core::hash::{BuildHasher, Hash, Hasher};

    use super::FixedHashState;
    use crate::hash::{HashMap, new_map};

    #[test]
    fn stable_between_hashers() {
        let mut a = FixedHashState.build_hasher();
        let mut b = FixedHashState.build_hasher();
        42_u32.hash(&mut a);
        42_u32.hash(&mut b);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn map_basic() {
        let mut map: HashMap<u32, &str> = new_map();
        map.insert(1, "one");
        map.insert(2, "two");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&2), Some(&"two"));
    }
}
