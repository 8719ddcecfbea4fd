//! SQLite persistence for cafes and users.
//!
//! A single connection guarded by a mutex. Every query is one statement, so each
//! call commits or fails on its own. Callers on the async side run these methods
//! through `spawn_blocking`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use thiserror::Error;
use tracing::info;

use crate::models::{Cafe, NewCafe, NewUser, User};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id        INTEGER PRIMARY KEY,
        name      VARCHAR(250) NOT NULL,
        email     VARCHAR(250) NOT NULL UNIQUE,
        password  VARCHAR(250) NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cafes (
        id              INTEGER PRIMARY KEY,
        name            VARCHAR(250) NOT NULL UNIQUE,
        map_url         VARCHAR(500) NOT NULL,
        img_url         VARCHAR(500) NOT NULL,
        location        VARCHAR(250) NOT NULL,
        seats           VARCHAR(250) NOT NULL,
        has_toilet      BOOLEAN NOT NULL,
        has_wifi        BOOLEAN NOT NULL,
        has_sockets     BOOLEAN NOT NULL,
        can_take_calls  BOOLEAN NOT NULL,
        coffee_price    VARCHAR(250),
        author_id       INTEGER REFERENCES users(id)
    );
";

const CAFE_COLUMNS: &str = "id, name, map_url, img_url, location, seats, has_toilet, has_wifi, \
                            has_sockets, can_take_calls, coffee_price, author_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a {table} with this {field} already exists")]
    Duplicate {
        table: &'static str,
        field: &'static str,
    },
    #[error("database lock poisoned")]
    Poisoned,
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and make sure both tables exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;
        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // -- Cafes --

    pub fn all_cafes_by_name(&self) -> Result<Vec<Cafe>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {CAFE_COLUMNS} FROM cafes ORDER BY name"))?;
        let cafes = stmt
            .query_map([], cafe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cafes)
    }

    pub fn all_cafes(&self) -> Result<Vec<Cafe>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {CAFE_COLUMNS} FROM cafes"))?;
        let cafes = stmt
            .query_map([], cafe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cafes)
    }

    pub fn count_cafes(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM cafes", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn cafe_by_id(&self, id: i64) -> Result<Option<Cafe>, StoreError> {
        let conn = self.conn()?;
        let cafe = conn
            .query_row(
                &format!("SELECT {CAFE_COLUMNS} FROM cafes WHERE id = ?1"),
                [id],
                cafe_from_row,
            )
            .optional()?;
        Ok(cafe)
    }

    /// Exact, case-sensitive match on `location`.
    pub fn cafes_at_location(&self, location: &str) -> Result<Vec<Cafe>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CAFE_COLUMNS} FROM cafes WHERE location = ?1 ORDER BY id"
        ))?;
        let cafes = stmt
            .query_map([location], cafe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cafes)
    }

    pub fn insert_cafe(&self, cafe: &NewCafe) -> Result<Cafe, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cafes (name, map_url, img_url, location, seats, has_toilet, has_wifi, \
             has_sockets, can_take_calls, coffee_price, author_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                cafe.name,
                cafe.map_url,
                cafe.img_url,
                cafe.location,
                cafe.seats,
                cafe.has_toilet,
                cafe.has_wifi,
                cafe.has_sockets,
                cafe.can_take_calls,
                cafe.coffee_price,
                cafe.author_id,
            ],
        )
        .map_err(|err| unique_violation(err, "cafe", "name"))?;

        Ok(Cafe {
            id: conn.last_insert_rowid(),
            name: cafe.name.clone(),
            map_url: cafe.map_url.clone(),
            img_url: cafe.img_url.clone(),
            location: cafe.location.clone(),
            seats: cafe.seats.clone(),
            has_toilet: cafe.has_toilet,
            has_wifi: cafe.has_wifi,
            has_sockets: cafe.has_sockets,
            can_take_calls: cafe.can_take_calls,
            coffee_price: cafe.coffee_price.clone(),
            author_id: cafe.author_id,
        })
    }

    /// Returns `false` when no cafe has this id.
    pub fn update_coffee_price(&self, id: i64, price: Option<&str>) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE cafes SET coffee_price = ?1 WHERE id = ?2",
            rusqlite::params![price, id],
        )?;
        Ok(changed > 0)
    }

    /// Returns `false` when no cafe has this id.
    pub fn delete_cafe(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM cafes WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    // -- Users --

    pub fn insert_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, email, password) VALUES (?1, ?2, ?3)",
            (&user.name, &user.email, &user.password),
        )
        .map_err(|err| unique_violation(err, "user", "email"))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            name: user.name.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
        })
    }

    pub fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, name, email, password FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, name, email, password FROM users WHERE email = ?1",
                [email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }
}

fn cafe_from_row(row: &Row<'_>) -> rusqlite::Result<Cafe> {
    Ok(Cafe {
        id: row.get(0)?,
        name: row.get(1)?,
        map_url: row.get(2)?,
        img_url: row.get(3)?,
        location: row.get(4)?,
        seats: row.get(5)?,
        has_toilet: row.get(6)?,
        has_wifi: row.get(7)?,
        has_sockets: row.get(8)?,
        can_take_calls: row.get(9)?,
        coffee_price: row.get(10)?,
        author_id: row.get(11)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
    })
}

fn unique_violation(err: rusqlite::Error, table: &'static str, field: &'static str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::Duplicate { table, field }
        }
        other => StoreError::Sqlite(other),
    }
}
