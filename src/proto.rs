//! Typed protocol envelopes.
//!
//! Inbound frames decode into the closed [`Request`] enum at the
//! boundary; dispatch is an exhaustive match, so a missing required
//! field is a decode failure rather than a runtime lookup error.
//! Outbound pushes are [`Push`]; register/login answers are
//! [`AuthReply`] (a bare status object without an `action` tag).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Register {
        username: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    GetData,
    GetHistory {
        target: String,
    },
    Msg {
        to: String,
        text: String,
    },
    SendFriendRequest {
        target: String,
    },
    HandleRequest {
        sender: String,
        decision: Decision,
    },
    CreateGroup {
        group_name: String,
    },
    JoinGroup {
        group_name: String,
    },
    CreatePublicRoom {
        room_name: String,
        #[serde(default)]
        tags: String,
    },
}

impl Request {
    /// Decode one inbound frame. Unknown actions and incomplete
    /// requests read as `None`; the caller skips them without
    /// dropping the connection.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    /// Trim surrounding whitespace from every identity-bearing field.
    /// Passwords and message text are left untouched.
    pub fn trim(&mut self) {
        match self {
            Request::Register { username, .. } | Request::Login { username, .. } => {
                trim_in_place(username);
            }
            Request::GetData => {}
            Request::GetHistory { target } | Request::SendFriendRequest { target } => {
                trim_in_place(target);
            }
            Request::Msg { to, .. } => trim_in_place(to),
            Request::HandleRequest { sender, .. } => trim_in_place(sender),
            Request::CreateGroup { group_name } | Request::JoinGroup { group_name } => {
                trim_in_place(group_name);
            }
            Request::CreatePublicRoom { room_name, tags } => {
                trim_in_place(room_name);
                trim_in_place(tags);
            }
        }
    }
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

/// Verdict on a pending friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

/// Ensure a group name carries its `#` prefix.
pub fn normalize_group(name: &str) -> String {
    if name.starts_with('#') {
        name.to_string()
    } else {
        format!("#{name}")
    }
}

/// Ensure a public-room name carries its `&` prefix.
pub fn normalize_room(name: &str) -> String {
    if name.starts_with('&') {
        name.to_string()
    } else {
        format!("&{name}")
    }
}

/// One persisted message as replayed to clients. The `to` field is the
/// stored receiver (raw addressing string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub sender: String,
    pub to: String,
    pub text: String,
}

/// A server-initiated frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Push {
    /// Live message delivery. For direct messages `to` echoes the
    /// sender so the recipient keys its conversation view by the other
    /// party regardless of direction.
    Msg {
        sender: String,
        to: String,
        text: String,
    },
    /// Full roster snapshot for one user.
    DataUpdate {
        friends: Vec<String>,
        groups: Vec<String>,
        requests: Vec<String>,
        active_users: Vec<String>,
        public_rooms: Vec<(String, String)>,
    },
    HistoryResponse {
        target: String,
        messages: Vec<HistoryMessage>,
    },
}

/// Response to a `register` or `login` request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthReply {
    pub status: &'static str,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl AuthReply {
    pub fn success(key: &str) -> Self {
        Self {
            status: "success",
            msg: "OK".to_string(),
            key: Some(key.to_string()),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error",
            msg: msg.into(),
            key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_actions() {
        let req = Request::from_value(json!({"action": "msg", "to": "bob", "text": "hi"}));
        assert!(matches!(req, Some(Request::Msg { .. })));

        let req = Request::from_value(json!({"action": "get_data"}));
        assert!(matches!(req, Some(Request::GetData)));

        let req = Request::from_value(json!({
            "action": "handle_request", "sender": "alice", "decision": "accept"
        }));
        assert!(matches!(
            req,
            Some(Request::HandleRequest { decision: Decision::Accept, .. })
        ));
    }

    #[test]
    fn unknown_action_is_skipped() {
        assert!(Request::from_value(json!({"action": "bogus"})).is_none());
        assert!(Request::from_value(json!({"no_action": true})).is_none());
    }

    #[test]
    fn missing_field_is_skipped() {
        assert!(Request::from_value(json!({"action": "msg", "to": "bob"})).is_none());
        assert!(Request::from_value(json!({"action": "login", "username": "a"})).is_none());
    }

    #[test]
    fn tags_default_to_empty() {
        let req = Request::from_value(json!({"action": "create_public_room", "room_name": "rust"}));
        match req {
            Some(Request::CreatePublicRoom { room_name, tags }) => {
                assert_eq!(room_name, "rust");
                assert_eq!(tags, "");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn trims_identity_fields_only() {
        let mut req =
            Request::from_value(json!({"action": "login", "username": " alice ", "password": " pw "}))
                .unwrap();
        req.trim();
        match req {
            Request::Login { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password, " pw ");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut req =
            Request::from_value(json!({"action": "msg", "to": "  bob ", "text": "  hi  "})).unwrap();
        req.trim();
        match req {
            Request::Msg { to, text } => {
                assert_eq!(to, "bob");
                assert_eq!(text, "  hi  ");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_group("team"), "#team");
        assert_eq!(normalize_group("#team"), "#team");
        assert_eq!(normalize_room("lobby"), "&lobby");
        assert_eq!(normalize_room("&lobby"), "&lobby");
    }

    #[test]
    fn auth_reply_shape() {
        let ok = serde_json::to_value(AuthReply::success("k3y")).unwrap();
        assert_eq!(ok, json!({"status": "success", "msg": "OK", "key": "k3y"}));

        let err = serde_json::to_value(AuthReply::error("Invalid credentials")).unwrap();
        assert_eq!(err, json!({"status": "error", "msg": "Invalid credentials"}));
    }

    #[test]
    fn push_shapes() {
        let msg = serde_json::to_value(Push::Msg {
            sender: "alice".into(),
            to: "alice".into(),
            text: "tok".into(),
        })
        .unwrap();
        assert_eq!(
            msg,
            json!({"action": "msg", "sender": "alice", "to": "alice", "text": "tok"})
        );

        let update = serde_json::to_value(Push::DataUpdate {
            friends: vec!["bob".into()],
            groups: vec!["#team".into()],
            requests: vec![],
            active_users: vec!["alice".into()],
            public_rooms: vec![("&rust".into(), "lang".into())],
        })
        .unwrap();
        assert_eq!(update["action"], "data_update");
        assert_eq!(update["public_rooms"], json!([["&rust", "lang"]]));
    }
}
