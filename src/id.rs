//! String identifiers for nodes, modes, fuels, products and scenarios.
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use std::borrow::Borrow;
use std::fmt::Display;
use std::hash::Hash;

/// Bounds shared by all identifier types
pub trait IDLike: Eq + Hash + Borrow<str> + Clone + Display + From<String> {}
impl<T> IDLike for T where T: Eq + Hash + Borrow<str> + Clone + Display + From<String> {}

/// Define a cheaply clonable, ordered string identifier.
///
/// The identifier is read from and written to CSV files as a plain string.
macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An identifier read from the input tables
        pub struct $name(pub std::rc::Rc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }
    };
}
pub(crate) use define_id_type;

/// An item which is keyed by its identifier
pub trait HasID<ID: IDLike> {
    /// The item's identifier
    fn get_id(&self) -> &ID;
}

/// Implement [`HasID`] for a struct with an `id` field
macro_rules! define_id_getter {
    ($t:ty, $id_ty:ty) => {
        impl crate::id::HasID<$id_ty> for $t {
            fn get_id(&self) -> &$id_ty {
                &self.id
            }
        }
    };
}
pub(crate) use define_id_getter;

/// Add an item to a map keyed by its identifier.
///
/// Fails if an item with the same identifier is already present. `kind` names the item in the
/// error message (e.g. "node").
pub fn insert_unique<ID, T>(map: &mut IndexMap<ID, T>, item: T, kind: &str) -> Result<()>
where
    ID: IDLike,
    T: HasID<ID>,
{
    let id = item.get_id().clone();
    ensure!(!map.contains_key(&id), "Duplicate {kind} {id}");
    map.insert(id, item);

    Ok(())
}
