//! Join form defaults and the ticket handed from the lobby to the room.

use parking_lot::Mutex;
use rand::Rng;

use crate::identity::{Identity, Role, RoomId};
use crate::SessionError;

/// Suggested values for the join form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinDefaults {
    /// A random participant name, `Participant0` to `Participant99`.
    pub participant_name: String,
    /// The configured default room.
    pub room: RoomId,
}

impl JoinDefaults {
    /// Generates fresh defaults for `default_room`.
    pub fn fresh(default_room: &RoomId) -> Self {
        let n: u8 = rand::thread_rng().gen_range(0..100);
        Self {
            participant_name: format!("Participant{n}"),
            room: default_room.clone(),
        }
    }
}

/// What the user typed into the join form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinForm {
    /// Display name.
    pub participant_name: String,
    /// Room name.
    pub room: String,
    /// Selected role.
    pub role: Role,
}

impl JoinForm {
    /// Prefills a form from `defaults`.
    pub fn from_defaults(defaults: &JoinDefaults) -> Self {
        Self {
            participant_name: defaults.participant_name.clone(),
            room: defaults.room.to_string(),
            role: Role::default(),
        }
    }

    /// Validates the form, producing the ticket for the room view.
    pub fn validate(&self) -> Result<RoomTicket, SessionError> {
        let participant_name = self.participant_name.trim();
        if participant_name.is_empty() {
            return Err(SessionError::InvalidJoinForm(
                "participant name is required".to_string(),
            ));
        }
        Ok(RoomTicket {
            room: RoomId::new(&self.room)?,
            participant_name: participant_name.to_string(),
            role: self.role,
        })
    }
}

/// A validated request to enter a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTicket {
    /// Room to join.
    pub room: RoomId,
    /// Display name.
    pub participant_name: String,
    /// Role to join with.
    pub role: Role,
}

impl RoomTicket {
    /// Creates an identity for this ticket with a fresh participant label.
    pub fn identity(&self) -> Identity {
        Identity::new(&self.participant_name)
    }
}

/// Holds the ticket between the join form and the room view.
///
/// The ticket is set when the form is submitted and cleared when the user leaves.
#[derive(Debug, Default)]
pub struct TicketStore {
    ticket: Mutex<Option<RoomTicket>>,
}

impl TicketStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `ticket`, replacing any previous one.
    pub fn set(&self, ticket: RoomTicket) {
        *self.ticket.lock() = Some(ticket);
    }

    /// Returns the current ticket.
    pub fn get(&self) -> Option<RoomTicket> {
        self.ticket.lock().clone()
    }

    /// Removes and returns the current ticket.
    pub fn clear(&self) -> Option<RoomTicket> {
        self.ticket.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_name_is_in_range() {
        let room = RoomId::new("SessionA").unwrap();
        for _ in 0..50 {
            let defaults = JoinDefaults::fresh(&room);
            let n: u32 = defaults
                .participant_name
                .strip_prefix("Participant")
                .unwrap()
                .parse()
                .unwrap();
            assert!(n < 100);
            assert_eq!(defaults.room, room);
        }
    }

    #[test]
    fn form_validation() {
        let room = RoomId::new("SessionA").unwrap();
        let mut form = JoinForm::from_defaults(&JoinDefaults::fresh(&room));
        form.participant_name = "  Alice ".to_string();
        form.role = Role::Watcher;
        let ticket = form.validate().unwrap();
        assert_eq!(ticket.participant_name, "Alice");
        assert_eq!(ticket.room, room);
        assert_eq!(ticket.role, Role::Watcher);
        assert!(ticket
            .identity()
            .label()
            .as_str()
            .starts_with("Alice-"));

        form.participant_name = " ".to_string();
        assert_matches!(form.validate(), Err(SessionError::InvalidJoinForm(_)));

        form.participant_name = "Alice".to_string();
        form.room = String::new();
        assert_matches!(form.validate(), Err(SessionError::InvalidJoinForm(_)));
    }

    #[test]
    fn ticket_store() {
        let store = TicketStore::new();
        assert!(store.get().is_none());
        let ticket = RoomTicket {
            room: RoomId::new("r").unwrap(),
            participant_name: "Bob".to_string(),
            role: Role::Talker,
        };
        store.set(ticket.clone());
        assert_eq!(store.get(), Some(ticket.clone()));
        assert_eq!(store.clear(), Some(ticket));
        assert!(store.get().is_none());
        assert!(store.clear().is_none());
    }
}
