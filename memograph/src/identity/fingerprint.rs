//! Fast content fingerprints.

use crate::value::Value;
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use twox_hash::XxHash64;

/// Mixing constant for non-associative hash combination.
const MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Salts keeping literal nodes and class nodes in disjoint hash domains.
const VALUE_SALT: u64 = 0x56414C;
const CLASS_SALT: u64 = 0x434C53;

/// Stable identifier for a request class.
///
/// Serializable requests carry a registered UUID; requests built from an
/// unregistered function fall back to the host's type identity, which is
/// valid only within one process and is refused for full caching.
#[derive(Clone, PartialEq, Eq)]
pub enum ClassId {
    /// Registered textual UUID, portable across processes.
    Uuid(Arc<str>),
    /// Host type identity of the function; intra-process only.
    Native(TypeId),
}

impl ClassId {
    pub fn uuid(uuid: impl Into<Arc<str>>) -> Self {
        Self::Uuid(uuid.into())
    }

    fn hash64(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(CLASS_SALT);
        match self {
            Self::Uuid(uuid) => {
                hasher.write_u8(0);
                hasher.write(uuid.as_bytes());
            }
            Self::Native(type_id) => {
                hasher.write_u8(1);
                type_id.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(uuid) => write!(f, "uuid:{}", uuid),
            Self::Native(_) => write!(f, "native-fn"),
        }
    }
}

enum NodeKind {
    /// A literal leaf; the value is retained so colliding hashes can be
    /// disambiguated structurally.
    Value(Value),
    /// A function application: class identity plus argument fingerprints.
    Class { class: ClassId, args: Vec<Fingerprint> },
}

struct Node {
    hash: u64,
    kind: NodeKind,
}

/// Content-derived identity of a request tree.
///
/// Cheap to clone and to hash. Equality is full structural equality — the
/// precomputed hash is only a fast path, so a hash collision between
/// distinct requests resolves to distinct cache records.
#[derive(Clone)]
pub struct Fingerprint(Arc<Node>);

impl Fingerprint {
    /// Fingerprint of a literal value.
    pub fn of_value(value: Value) -> Self {
        let hash = mix(VALUE_SALT, hash_value(&value));
        Self(Arc::new(Node {
            hash,
            kind: NodeKind::Value(value),
        }))
    }

    /// Fingerprint of a function application over argument fingerprints.
    pub fn of_class(class: ClassId, args: Vec<Fingerprint>) -> Self {
        let mut hash = class.hash64();
        for arg in &args {
            hash = mix(hash, arg.hash64());
        }
        Self(Arc::new(Node {
            hash,
            kind: NodeKind::Class { class, args },
        }))
    }

    /// The precomputed 64-bit hash.
    pub fn hash64(&self) -> u64 {
        self.0.hash
    }

    fn structurally_equal(&self, other: &Fingerprint) -> bool {
        match (&self.0.kind, &other.0.kind) {
            (NodeKind::Value(a), NodeKind::Value(b)) => a.identical(b),
            (
                NodeKind::Class { class: ca, args: aa },
                NodeKind::Class { class: cb, args: ab },
            ) => {
                ca == cb
                    && aa.len() == ab.len()
                    && aa.iter().zip(ab).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Fingerprint) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        self.0.hash == other.0.hash && self.structurally_equal(other)
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0.hash)
    }
}

/// Boost-style hash_combine; order-sensitive.
fn mix(acc: u64, hash: u64) -> u64 {
    acc ^ hash
        .wrapping_add(MIX)
        .wrapping_add(acc << 6)
        .wrapping_add(acc >> 2)
}

fn hash_value(value: &Value) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    fold_value(&mut hasher, value);
    hasher.finish()
}

fn fold_value(hasher: &mut XxHash64, value: &Value) {
    match value {
        Value::Nil => hasher.write_u8(0),
        Value::Boolean(v) => {
            hasher.write_u8(1);
            hasher.write_u8(u8::from(*v));
        }
        Value::Integer(v) => {
            hasher.write_u8(2);
            hasher.write_i64(*v);
        }
        Value::Float(v) => {
            hasher.write_u8(3);
            hasher.write_u64(v.to_bits());
        }
        Value::String(v) => {
            hasher.write_u8(4);
            hasher.write_u64(v.len() as u64);
            hasher.write(v.as_bytes());
        }
        Value::Blob(v) => {
            hasher.write_u8(5);
            hasher.write_u64(v.len() as u64);
            hasher.write(v.as_slice());
        }
        Value::Datetime(v) => {
            hasher.write_u8(6);
            hasher.write_i64(v.timestamp_millis());
        }
        Value::Array(items) => {
            hasher.write_u8(7);
            hasher.write_u64(items.len() as u64);
            for item in items {
                fold_value(hasher, item);
            }
        }
        // Maps compare unordered, so entries fold commutatively.
        Value::Map(entries) => {
            hasher.write_u8(8);
            hasher.write_u64(entries.len() as u64);
            let mut acc = 0u64;
            for (key, val) in entries {
                let mut entry_hasher = XxHash64::with_seed(0);
                fold_value(&mut entry_hasher, key);
                fold_value(&mut entry_hasher, val);
                acc ^= entry_hasher.finish();
            }
            hasher.write_u64(acc);
        }
    }
}
