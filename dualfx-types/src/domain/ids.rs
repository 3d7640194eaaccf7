//! Identifiers and the transaction context a rate lock belongs to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Identifies one point-of-sale transaction.
    TransactionId
);
uuid_id!(
    /// Identifies a recorded medical-aid award.
    AwardId
);
uuid_id!(
    /// Identifies one audit log entry.
    AuditEntryId
);

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Order number as issued by the point of sale (e.g. `ORD-2025-0042`).
    OrderId
);
string_id!(
    /// The desk user performing an action.
    UserId
);

/// The transaction/order a rate lock and its audit entries belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    pub transaction_id: Option<TransactionId>,
    pub order_id: Option<OrderId>,
}

impl TransactionContext {
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            transaction_id: Some(TransactionId::new()),
            order_id: Some(order_id),
        }
    }

    /// A context not tied to any order, used for desk-level rate updates.
    pub fn detached() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_id_round_trips_through_str() {
        let id = AwardId::new();
        let parsed: AwardId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_context_for_order_gets_transaction() {
        let ctx = TransactionContext::for_order(OrderId::from("ORD-1"));
        assert!(ctx.transaction_id.is_some());
        assert_eq!(ctx.order_id.as_ref().map(OrderId::as_str), Some("ORD-1"));
        assert_eq!(TransactionContext::detached().order_id, None);
    }
}
