//! Provide hash containers, re-exports *hashbrown* and *foldhash*.
//!
//! All containers use [`FixedHashState`], so iteration order and hash values
//! only depend on the inserted keys, never on the process.

// -----------------------------------------------------------------------------
// Modules

mod hasher;

// -----------------------------------------------------------------------------
// Exports

pub use hasher::{FixedHashState, FixedHasher};

/// A [`hashbrown::HashMap`] using [`FixedHashState`].
pub type HashMap<K, V> = hashbrown::HashMap<K, V, FixedHashState>;

/// Creates an empty [`HashMap`], usable in `const` and `static` contexts.
///
/// # Examples
///
/// ```
/// use crs_utils::hash::{new_map, HashMap};
///
/// let mut map: HashMap<&str, u32> = new_map();
/// map.insert("a", 1);
/// assert_eq!(map.get("a"), Some(&1));
/// ```
#[inline]
pub const fn new_map<K, V>() -> HashMap<K, V> {
    hashbrown::HashMap::with_hasher(FixedHashState)
}

// -----------------------------------------------------------------------------
// Re-export crates

pub use foldhash;
pub use hashbrown;
