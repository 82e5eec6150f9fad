//! The typed view of a stream entry as a client notification.
//!
//! Wire fields:
//!
//! - `type`: required, non-empty
//! - `user_id`: the single recipient, or
//! - `broadcast = "true"`: every live connection
//!
//! Every other field is carried through untouched, except `id`, which is
//! reserved for the entry id in the client payload.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use tollgate_core::{EntryId, UserId};
use tollgate_store::{Fields, StreamEntry};

use crate::error::{BrokerError, Result};

/// Field naming the notification type.
pub const TYPE_FIELD: &str = "type";
/// Field naming the recipient user.
pub const USER_FIELD: &str = "user_id";
/// Field marking a notification for every connection.
pub const BROADCAST_FIELD: &str = "broadcast";
/// Payload key carrying the entry id; producers may not set it.
pub const ID_FIELD: &str = "id";

/// Who a notification is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every connection of one user.
    User(UserId),
    /// Every live connection.
    Broadcast,
}

/// A notification parsed from a stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The entry id.
    pub id: EntryId,
    /// The recipient.
    pub target: Target,
    /// The `type` field.
    pub kind: String,
    /// All fields of the entry, routing fields included.
    pub fields: Fields,
}

impl Notification {
    /// Parse a stream entry.
    ///
    /// # Errors
    ///
    /// Returns `MalformedNotification` if the entry has no `type`, neither
    /// a valid `user_id` nor `broadcast = "true"`, or a reserved `id` field.
    pub fn from_entry(entry: &StreamEntry) -> Result<Self> {
        reject_reserved(&entry.fields)?;

        let kind = entry
            .fields
            .get(TYPE_FIELD)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BrokerError::MalformedNotification("missing type".to_string()))?
            .clone();

        let target = if entry.fields.get(BROADCAST_FIELD).map(String::as_str) == Some("true") {
            Target::Broadcast
        } else {
            let user = entry.fields.get(USER_FIELD).ok_or_else(|| {
                BrokerError::MalformedNotification("missing user_id".to_string())
            })?;
            Target::User(
                UserId::new(user.as_str())
                    .map_err(|e| BrokerError::MalformedNotification(e.to_string()))?,
            )
        };

        Ok(Self {
            id: entry.id,
            target,
            kind,
            fields: entry.fields.clone(),
        })
    }

    /// Build the fields of a notification ready to append.
    ///
    /// Routing fields in `data` are overwritten by `target` and `kind`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedNotification` if `data` sets the reserved `id` field.
    pub fn fields(target: &Target, kind: &str, data: Fields) -> Result<Fields> {
        reject_reserved(&data)?;
        let mut fields = data;
        fields.remove(USER_FIELD);
        fields.remove(BROADCAST_FIELD);
        match target {
            Target::User(user) => {
                fields.insert(USER_FIELD.to_string(), user.to_string());
            }
            Target::Broadcast => {
                fields.insert(BROADCAST_FIELD.to_string(), "true".to_string());
            }
        }
        fields.insert(TYPE_FIELD.to_string(), kind.to_string());
        Ok(fields)
    }

    /// Render the client payload: the entry id plus every field.
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        for (key, value) in &self.fields {
            object.insert(key.clone(), Value::String(value.clone()));
        }
        object.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
        Value::Object(object).to_string()
    }
}

fn reject_reserved(fields: &Fields) -> Result<()> {
    if fields.contains_key(ID_FIELD) {
        return Err(BrokerError::MalformedNotification(format!(
            "field {ID_FIELD:?} is reserved"
        )));
    }
    Ok(())
}

/// Where the delivery consumer hands rendered notifications.
///
/// Both methods return the number of connections the payload was queued on;
/// zero is not an error.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver to every connection of one user.
    async fn send_to_user(&self, user: &UserId, payload: Arc<str>) -> usize;

    /// Deliver to every live connection.
    async fn broadcast(&self, payload: Arc<str>) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(&str, &str)]) -> StreamEntry {
        StreamEntry {
            id: EntryId::new(1_700_000_000_000, 0),
            fields: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn parses_user_notification() {
        let n = Notification::from_entry(&entry(&[
            ("type", "task_assigned"),
            ("user_id", "U1"),
            ("task_id", "T1"),
        ]))
        .unwrap();
        assert_eq!(n.target, Target::User(UserId::new("U1").unwrap()));
        assert_eq!(n.kind, "task_assigned");
    }

    #[test]
    fn parses_broadcast() {
        let n = Notification::from_entry(&entry(&[("type", "maintenance"), ("broadcast", "true")]))
            .unwrap();
        assert_eq!(n.target, Target::Broadcast);
    }

    #[test]
    fn rejects_missing_type_or_target() {
        assert!(matches!(
            Notification::from_entry(&entry(&[("user_id", "U1")])),
            Err(BrokerError::MalformedNotification(_))
        ));
        assert!(matches!(
            Notification::from_entry(&entry(&[("type", "x")])),
            Err(BrokerError::MalformedNotification(_))
        ));
        assert!(matches!(
            Notification::from_entry(&entry(&[("type", "x"), ("broadcast", "yes")])),
            Err(BrokerError::MalformedNotification(_))
        ));
    }

    #[test]
    fn json_contains_id_and_fields() {
        let n = Notification::from_entry(&entry(&[
            ("type", "task_assigned"),
            ("user_id", "U1"),
            ("task_id", "T1"),
        ]))
        .unwrap();
        let json: Value = serde_json::from_str(&n.to_json()).unwrap();
        assert_eq!(json["id"], "1700000000000-0");
        assert_eq!(json["type"], "task_assigned");
        assert_eq!(json["user_id"], "U1");
        assert_eq!(json["task_id"], "T1");
    }

    #[test]
    fn fields_builder_sets_routing() {
        let data = Fields::from([
            ("task_id".to_string(), "T1".to_string()),
            ("broadcast".to_string(), "true".to_string()),
        ]);
        let user = UserId::new("U1").unwrap();
        let fields = Notification::fields(&Target::User(user), "task_assigned", data).unwrap();
        assert_eq!(fields["user_id"], "U1");
        assert_eq!(fields["type"], "task_assigned");
        assert!(!fields.contains_key("broadcast"));
    }

    #[test]
    fn producer_id_field_is_rejected() {
        let data = Fields::from([("id".to_string(), "mine".to_string())]);
        assert!(matches!(
            Notification::fields(&Target::Broadcast, "maintenance", data),
            Err(BrokerError::MalformedNotification(_))
        ));

        assert!(matches!(
            Notification::from_entry(&entry(&[("type", "x"), ("user_id", "U1"), ("id", "mine")])),
            Err(BrokerError::MalformedNotification(_))
        ));
    }
}
