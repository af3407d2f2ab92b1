//! SQLite storage gateway.
//!
//! Durable home of accounts, friendships, friend requests, groups,
//! public rooms, and message history. Each logical operation runs in
//! one transaction; compound mutations (group creation, request
//! acceptance) use an explicit transaction so a crash cannot leave
//! partial state.
//!
//! Passwords are stored as unsalted SHA-256 hex. That is a known
//! weakness of the current design and is preserved as-is.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Result as SqlResult, params};
use sha2::{Digest, Sha256};

use crate::proto::{Decision, HistoryMessage};

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Success,
    Taken,
}

/// Result of sending a friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestOutcome {
    Success,
    AlreadyFriends,
    AlreadySent,
    NotFound,
    SelfRequest,
}

/// Database handle wrapping a SQLite connection.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> SqlResult<()> {
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS friends (
                user_1 TEXT NOT NULL,
                user_2 TEXT NOT NULL,
                PRIMARY KEY (user_1, user_2)
            );

            CREATE TABLE IF NOT EXISTS friend_requests (
                sender   TEXT NOT NULL,
                receiver TEXT NOT NULL,
                PRIMARY KEY (sender, receiver)
            );

            CREATE TABLE IF NOT EXISTS groups (
                group_name TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS group_members (
                group_name TEXT NOT NULL,
                username   TEXT NOT NULL,
                PRIMARY KEY (group_name, username)
            );

            CREATE TABLE IF NOT EXISTS public_rooms (
                room_name TEXT PRIMARY KEY,
                tags      TEXT,
                creator   TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                sender    TEXT NOT NULL,
                receiver  TEXT NOT NULL,
                content   TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            ",
        )
    }

    fn hash_password(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    // ── Accounts ───────────────────────────────────────────────────

    pub fn register_user(&self, username: &str, password: &str) -> SqlResult<RegisterOutcome> {
        let result = self.conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params![username, Self::hash_password(password)],
        );
        match result {
            Ok(_) => Ok(RegisterOutcome::Success),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(RegisterOutcome::Taken)
            }
            Err(e) => Err(e),
        }
    }

    pub fn check_login(&self, username: &str, password: &str) -> SqlResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1 AND password_hash = ?2",
                params![username, Self::hash_password(password)],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn user_exists(&self, username: &str) -> SqlResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ── Friends ────────────────────────────────────────────────────

    pub fn send_friend_request(
        &self,
        sender: &str,
        receiver: &str,
    ) -> SqlResult<FriendRequestOutcome> {
        if sender == receiver {
            return Ok(FriendRequestOutcome::SelfRequest);
        }
        if !self.user_exists(receiver)? {
            return Ok(FriendRequestOutcome::NotFound);
        }
        let already_friends = self
            .conn
            .query_row(
                "SELECT 1 FROM friends WHERE user_1 = ?1 AND user_2 = ?2",
                params![sender, receiver],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if already_friends {
            return Ok(FriendRequestOutcome::AlreadyFriends);
        }
        let result = self.conn.execute(
            "INSERT INTO friend_requests (sender, receiver) VALUES (?1, ?2)",
            params![sender, receiver],
        );
        match result {
            Ok(_) => Ok(FriendRequestOutcome::Success),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(FriendRequestOutcome::AlreadySent)
            }
            Err(e) => Err(e),
        }
    }

    pub fn pending_requests(&self, username: &str) -> SqlResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sender FROM friend_requests WHERE receiver = ?1")?;
        let rows = stmt.query_map(params![username], |row| row.get(0))?;
        rows.collect()
    }

    /// Resolve a pending request. Deletes it and, on accept, inserts the
    /// symmetric friend pair, all in one transaction. Idempotent.
    pub fn handle_request(
        &mut self,
        sender: &str,
        receiver: &str,
        decision: Decision,
    ) -> SqlResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM friend_requests WHERE sender = ?1 AND receiver = ?2",
            params![sender, receiver],
        )?;
        if decision == Decision::Accept {
            tx.execute(
                "INSERT OR IGNORE INTO friends (user_1, user_2) VALUES (?1, ?2)",
                params![receiver, sender],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friends (user_1, user_2) VALUES (?1, ?2)",
                params![sender, receiver],
            )?;
        }
        tx.commit()
    }

    pub fn friends_of(&self, username: &str) -> SqlResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_2 FROM friends WHERE user_1 = ?1")?;
        let rows = stmt.query_map(params![username], |row| row.get(0))?;
        rows.collect()
    }

    // ── Groups ─────────────────────────────────────────────────────

    /// Create a private group with the creator as first member, in one
    /// transaction. Returns false when the name is taken.
    pub fn create_group(&mut self, group_name: &str, creator: &str) -> SqlResult<bool> {
        let tx = self.conn.transaction()?;
        let result = tx.execute(
            "INSERT INTO groups (group_name) VALUES (?1)",
            params![group_name],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        tx.execute(
            "INSERT INTO group_members (group_name, username) VALUES (?1, ?2)",
            params![group_name, creator],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Add a user to an existing group. Idempotent; false when the
    /// group does not exist.
    pub fn join_group(&self, group_name: &str, username: &str) -> SqlResult<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM groups WHERE group_name = ?1",
                params![group_name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO group_members (group_name, username) VALUES (?1, ?2)",
            params![group_name, username],
        )?;
        Ok(true)
    }

    pub fn group_members(&self, group_name: &str) -> SqlResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username FROM group_members WHERE group_name = ?1")?;
        let rows = stmt.query_map(params![group_name], |row| row.get(0))?;
        rows.collect()
    }

    pub fn user_groups(&self, username: &str) -> SqlResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT group_name FROM group_members WHERE username = ?1")?;
        let rows = stmt.query_map(params![username], |row| row.get(0))?;
        rows.collect()
    }

    // ── Public rooms ───────────────────────────────────────────────

    /// Register a public room. Returns false when the name is taken.
    pub fn create_public_room(
        &self,
        room_name: &str,
        tags: &str,
        creator: &str,
    ) -> SqlResult<bool> {
        let result = self.conn.execute(
            "INSERT INTO public_rooms (room_name, tags, creator) VALUES (?1, ?2, ?3)",
            params![room_name, tags, creator],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn public_rooms(&self) -> SqlResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare("SELECT room_name, tags FROM public_rooms")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ))
        })?;
        rows.collect()
    }

    // ── Message history ────────────────────────────────────────────

    /// Append a message. `receiver` is the raw addressing string
    /// (username, `#group`, or `&room`); `content` is opaque ciphertext.
    pub fn store_message(&self, sender: &str, receiver: &str, content: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO messages (sender, receiver, content) VALUES (?1, ?2, ?3)",
            params![sender, receiver, content],
        )?;
        Ok(())
    }

    /// History between two endpoints, oldest first. A `#group`/`&room`
    /// target returns every row addressed to it; a username returns
    /// rows in either direction of the pair.
    pub fn chat_history(&self, user: &str, target: &str) -> SqlResult<Vec<HistoryMessage>> {
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(HistoryMessage {
                sender: row.get(0)?,
                to: row.get(1)?,
                text: row.get(2)?,
            })
        };
        if target.starts_with('#') || target.starts_with('&') {
            let mut stmt = self.conn.prepare(
                "SELECT sender, receiver, content FROM messages
                 WHERE receiver = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![target], map_row)?;
            rows.collect()
        } else {
            let mut stmt = self.conn.prepare(
                "SELECT sender, receiver, content FROM messages
                 WHERE (sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1)
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![user, target], map_row)?;
            rows.collect()
        }
    }
}
