use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied string identifiers. The core never mints these.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// A regulated actor.
    NodeId
);
string_id!(VariableId);
string_id!(EpisodeId);
string_id!(ActionId);
string_id!(ModelId);
string_id!(NoteId);
string_id!(LinkId);
string_id!(ProxyId);
string_id!(
    /// Globally unique across every node writing to a signal log.
    EventId
);

#[cfg(test)]
mod tests {
    use super::{EpisodeId, NodeId};

    #[test]
    fn ids_display_their_raw_value() {
        assert_eq!(NodeId::new("node-a").to_string(), "node-a");
        assert_eq!(EpisodeId::from("ep-1").as_str(), "ep-1");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&NodeId::new("n1")).expect("serialize");
        assert_eq!(json, "\"n1\"");
        let back: NodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, NodeId::new("n1"));
    }
}
