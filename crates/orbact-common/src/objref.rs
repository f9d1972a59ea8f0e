//! Object references and object-key parsing.
//!
//! Every reference a mediated server publishes carries an object key whose
//! first path segment is the id of the owning server. The mediator only ever
//! parses a key down to that segment; the remainder stays opaque and is
//! handed back verbatim when the reference is rebuilt against the server's
//! real address.

use serde::{Deserialize, Serialize};

/// Identifies a managed server. Also the first path segment of every object
/// key the server owns.
pub type ServerId = String;

/// Separates the server id from the rest of an object key.
pub const KEY_SEPARATOR: u8 = b'/';

/// Escapes the following byte inside an object key. An escaped separator
/// does not terminate the server id.
pub const KEY_ESCAPE: u8 = b'\\';

/// Transport address of a server or a bind constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    addr: String,
    local: bool,
}

impl Address {
    /// A remote address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            local: false,
        }
    }

    /// An address marking the local broker.
    pub fn local(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            local: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.addr
    }

    pub fn is_local(&self) -> bool {
        self.local
    }
}

/// A server's advertised reference template: the address part shared by all
/// references the server publishes. Sent to the mediator when the server
/// first connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrTemplate {
    address: Address,
}

impl AddrTemplate {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Construct a reference from this template plus an object key and
    /// object id.
    pub fn make_ref(&self, object_key: &[u8], object_id: &[u8]) -> ObjRef {
        ObjRef {
            address: self.address.clone(),
            object_key: object_key.to_vec(),
            object_id: object_id.to_vec(),
        }
    }
}

/// An object reference: the address it points at plus the key and id that
/// identify the object to its owning server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjRef {
    pub address: Address,
    pub object_key: Vec<u8>,
    pub object_id: Vec<u8>,
}

impl ObjRef {
    pub fn new(address: Address, object_key: Vec<u8>, object_id: Vec<u8>) -> Self {
        Self {
            address,
            object_key,
            object_id,
        }
    }

    /// Raw object-key bytes.
    pub fn object_key(&self) -> &[u8] {
        &self.object_key
    }

    /// Id of the server owning this reference's object.
    pub fn server_id(&self) -> ServerId {
        server_id_of_key(&self.object_key)
    }
}

/// Extract the owning server id from an object key: the first path segment,
/// up to an unescaped [`KEY_SEPARATOR`]. A separator preceded by an odd run
/// of [`KEY_ESCAPE`] bytes is part of the id; escape bytes themselves are
/// dropped from the result. A key with no unescaped separator is all id.
pub fn server_id_of_key(key: &[u8]) -> ServerId {
    let mut run = 0usize;
    let mut end = key.len();
    for (i, &b) in key.iter().enumerate() {
        if b == KEY_ESCAPE {
            run += 1;
        } else if b == KEY_SEPARATOR && run % 2 == 0 {
            end = i;
            break;
        } else {
            run = 0;
        }
    }

    let mut id = Vec::with_capacity(end);
    let mut j = 0;
    while j < end {
        if key[j] == KEY_ESCAPE {
            j += 1;
            if j >= end {
                break;
            }
        }
        id.push(key[j]);
        j += 1;
    }
    String::from_utf8_lossy(&id).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_key() {
        assert_eq!(server_id_of_key(b"srv-a/counter"), "srv-a");
    }

    #[test]
    fn test_key_without_separator_is_all_id() {
        assert_eq!(server_id_of_key(b"srv-a"), "srv-a");
    }

    #[test]
    fn test_escaped_separator_stays_in_id() {
        assert_eq!(server_id_of_key(b"a\\/b/obj"), "a/b");
    }

    #[test]
    fn test_escaped_escape_then_separator_terminates() {
        // "\\" collapses to a literal escape byte; the following separator
        // is unescaped and ends the id.
        assert_eq!(server_id_of_key(b"a\\\\/obj"), "a\\");
    }

    #[test]
    fn test_empty_key() {
        assert_eq!(server_id_of_key(b""), "");
    }

    #[test]
    fn test_leading_separator_yields_empty_id() {
        assert_eq!(server_id_of_key(b"/obj"), "");
    }

    #[test]
    fn test_trailing_escape_is_dropped() {
        assert_eq!(server_id_of_key(b"ab\\"), "ab");
    }

    #[test]
    fn test_make_ref_combines_template_and_key() {
        let template = AddrTemplate::new(Address::new("tcp://host-b:7001"));
        let r = template.make_ref(b"srv-b/obj", b"obj");
        assert_eq!(r.address.as_str(), "tcp://host-b:7001");
        assert_eq!(r.object_key(), b"srv-b/obj");
        assert_eq!(r.object_id, b"obj");
        assert_eq!(r.server_id(), "srv-b");
    }

    #[test]
    fn test_local_address() {
        assert!(Address::local("inproc").is_local());
        assert!(!Address::new("tcp://x").is_local());
    }
}
