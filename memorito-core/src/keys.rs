//! # Cache Key Derivation
//!
//! Arguments are turned into a key by serializing them to JSON. Two argument
//! lists hit the same entry exactly when they serialize to the same text.
//! Values that should compare by identity instead of by content are wrapped
//! in [`ByIdentity`], which serializes as the object's identity token.

use serde::ser::Error as _;
use serde::{Serialize, Serializer};

use crate::depth_limit::Limited;
use crate::identity::IdentityRegistry;
use crate::{MemoizeError, ObjectRef};

/// Derives the cache key for an argument list.
///
/// Pass the arguments as a tuple; `()` is the empty argument list.
///
/// # Errors
///
/// [`MemoizeError::Serialization`] when any argument can not be serialized,
/// including arguments nested too deeply to be anything but cyclic.
///
/// # Examples
///
/// ```
/// use memorito_core::derive_key;
///
/// assert_eq!(derive_key(&(1, "two")).unwrap(), r#"[1,"two"]"#);
/// assert_eq!(derive_key(&(1, "two")).unwrap(), derive_key(&(1, "two")).unwrap());
/// assert_ne!(derive_key(&(1,)).unwrap(), derive_key(&("1",)).unwrap());
/// ```
pub fn derive_key<A>(args: &A) -> Result<String, MemoizeError>
where
    A: Serialize + ?Sized,
{
    let mut out = Vec::with_capacity(64);
    Limited::new(args).serialize(&mut serde_json::Serializer::new(&mut out))?;
    String::from_utf8(out).map_err(|err| MemoizeError::Serialization(err.to_string()))
}

/// Serializes the wrapped object as its identity token instead of its content.
///
/// Use this for arguments that are functions or other shared objects whose
/// contents are irrelevant (or not serializable) for cache lookups.
///
/// # Examples
///
/// ```
/// use memorito_core::{derive_key, ByIdentity};
/// use std::sync::Arc;
///
/// let double: Arc<dyn Fn(i32) -> i32 + Send + Sync> = Arc::new(|x| x * 2);
/// let also_double: Arc<dyn Fn(i32) -> i32 + Send + Sync> = Arc::new(|x| x * 2);
///
/// let a = derive_key(&(ByIdentity(&double), 3)).unwrap();
/// let b = derive_key(&(ByIdentity(&double), 3)).unwrap();
/// let c = derive_key(&(ByIdentity(&also_double), 3)).unwrap();
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// assert!(a.starts_with("[\"memoize["));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ByIdentity<'a, R: ?Sized>(pub &'a R);

impl<R> Serialize for ByIdentity<'_, R>
where
    R: ObjectRef + ?Sized,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let id = IdentityRegistry::global()
            .id_of(self.0)
            .map_err(S::Error::custom)?;
        serializer.serialize_str(&format!("memoize[{}]", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, HashMap};
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Serialize)]
    struct Query {
        table: &'static str,
        limit: u32,
    }

    #[test]
    fn test_empty_argument_list() {
        assert_eq!(derive_key(&()).unwrap(), "null");
    }

    #[test]
    fn test_structs_compare_structurally() {
        let a = derive_key(&(Query { table: "users", limit: 10 },)).unwrap();
        let b = derive_key(&(Query { table: "users", limit: 10 },)).unwrap();
        let c = derive_key(&(Query { table: "users", limit: 11 },)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_map_key_order_follows_the_map() {
        let mut map = BTreeMap::new();
        map.insert("b", 2);
        map.insert("a", 1);
        assert_eq!(derive_key(&(map,)).unwrap(), r#"[{"a":1,"b":2}]"#);
    }

    #[test]
    fn test_unsupported_values_fail() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1);
        let err = derive_key(&(map,)).unwrap_err();
        assert!(matches!(err, MemoizeError::Serialization(_)));
    }

    #[derive(Serialize)]
    struct Node {
        label: &'static str,
        next: Option<Rc<RefCell<Node>>>,
    }

    #[test]
    fn test_cyclic_argument_fails() {
        let node = Rc::new(RefCell::new(Node {
            label: "loop",
            next: None,
        }));
        node.borrow_mut().next = Some(Rc::clone(&node));

        let err = derive_key(&(Rc::clone(&node),)).unwrap_err();
        assert!(matches!(err, MemoizeError::Serialization(ref msg) if msg.contains("recursion limit")));

        node.borrow_mut().next = None;
    }

    #[test]
    fn test_deep_but_finite_nesting_is_accepted() {
        let mut value = serde_json::json!(1);
        for _ in 0..100 {
            value = serde_json::json!([value]);
        }
        let key = derive_key(&(value,)).unwrap();
        assert!(key.starts_with("[[[[") && key.ends_with("]]]]"));
    }

    #[test]
    fn test_identity_of_non_object_fails() {
        let missing: Option<Arc<u8>> = None;
        let err = derive_key(&(ByIdentity(&missing),)).unwrap_err();
        assert!(matches!(err, MemoizeError::Serialization(ref msg) if msg.contains("identity")));
    }

    #[test]
    fn test_identity_is_stable() {
        let handler = Arc::new(|| ());
        let first = derive_key(&(ByIdentity(&handler),)).unwrap();
        let second = derive_key(&(ByIdentity(&Arc::clone(&handler)),)).unwrap();
        assert_eq!(first, second);
    }
}
