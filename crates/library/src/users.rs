use common::{Identity, SubsonicRoles, User};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use crate::{Library, LibraryError};

const USER_COLUMNS: &str = "username, password, email, is_admin, stream_role, download_role, \
     playlist_role, cover_art_role, comment_role, share_role, scrobbling_enabled, max_bit_rate";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        password: row.get(1)?,
        email: row.get(2)?,
        is_admin: row.get::<_, i64>(3)? != 0,
        roles: SubsonicRoles {
            stream: row.get::<_, i64>(4)? != 0,
            download: row.get::<_, i64>(5)? != 0,
            playlist: row.get::<_, i64>(6)? != 0,
            cover_art: row.get::<_, i64>(7)? != 0,
            comment: row.get::<_, i64>(8)? != 0,
            share: row.get::<_, i64>(9)? != 0,
            scrobbling: row.get::<_, i64>(10)? != 0,
            max_bit_rate: row.get::<_, i64>(11)?.max(0) as u32,
        },
    })
}

impl Library {
    /// Inserts the default admin account once, when the user table is
    /// empty.
    pub fn ensure_default_admin(&self) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }
        conn.execute(
            "INSERT INTO users (username, password, is_admin) VALUES ('admin', 'admin', 1)",
            [],
        )?;
        info!("Created default admin user");
        Ok(())
    }

    pub fn user(&self, username: &str) -> Result<Option<User>, LibraryError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Rewrites the stored password, typically to upgrade a clear-text
    /// password to its encrypted form.
    pub fn set_user_password(&self, username: &str, password: &str) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET password = ?1 WHERE username = ?2",
            params![password, username],
        )?;
        Ok(())
    }

    pub fn system_setting(&self, key: &str) -> Result<Option<String>, LibraryError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM system_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn put_system_setting(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO system_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn identity(&self, username: &str) -> Result<Option<Identity>, LibraryError> {
        let conn = self.conn()?;
        let identity = conn
            .query_row(
                "SELECT username, uuid, password, url FROM identities WHERE username = ?1",
                params![username],
                |row| {
                    Ok(Identity {
                        username: row.get(0)?,
                        uuid: row.get(1)?,
                        password: row.get(2)?,
                        url: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    pub fn upsert_identity(&self, identity: &Identity) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO identities (username, uuid, password, url) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username) DO UPDATE SET
                 uuid = excluded.uuid,
                 password = excluded.password,
                 url = excluded.url",
            params![identity.username, identity.uuid, identity.password, identity.url],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_library() -> Library {
        Library::open_in_memory(std::path::Path::new("/tmp")).unwrap()
    }

    #[test]
    fn default_admin_created_only_when_empty() {
        let library = test_library();
        library.ensure_default_admin().unwrap();
        library.ensure_default_admin().unwrap();
        let conn = library.conn().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        // Release the single pooled connection before calling back into the
        // library, which acquires its own connection from the max_size(1) pool.
        drop(conn);
        let admin = library.user("admin").unwrap().unwrap();
        assert!(admin.is_admin);
        assert!(admin.roles.stream);
    }

    #[test]
    fn system_settings_round_trip() {
        let library = test_library();
        assert_eq!(library.system_setting("jwt_secret").unwrap(), None);
        library.put_system_setting("jwt_secret", "abc").unwrap();
        library.put_system_setting("jwt_secret", "def").unwrap();
        assert_eq!(
            library.system_setting("jwt_secret").unwrap(),
            Some("def".to_string())
        );
    }

    #[test]
    fn identity_upsert_overwrites() {
        let library = test_library();
        let mut identity = Identity {
            username: "alice".to_string(),
            uuid: "u1".to_string(),
            password: "p1".to_string(),
            url: "https://cc.example".to_string(),
        };
        library.upsert_identity(&identity).unwrap();
        identity.password = "p2".to_string();
        library.upsert_identity(&identity).unwrap();
        let stored = library.identity("alice").unwrap().unwrap();
        assert_eq!(stored.password, "p2");
    }
}
