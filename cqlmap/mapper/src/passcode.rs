//! One-time passcode storage
//!
//! A small fixed-shape table keyed by an id, holding a passcode and its
//! expiry. Table and column names are lower-cased.

use crate::entity::{FromCql, ToCql};
use crate::session::{self, SessionGuard, SessionProvider};
use crate::statement::Statement;
use crate::{CqlValue, MapperError, MapperResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub struct PasscodeRepository {
    provider: Arc<dyn SessionProvider>,
    table: String,
    id_column: String,
    passcode_column: String,
    expired_at_column: String,
}

impl PasscodeRepository {
    /// Repository over `table` with columns `id`, `passcode` and `expiredat`
    pub fn new(provider: Arc<dyn SessionProvider>, table: &str) -> Self {
        Self {
            provider,
            table: table.to_lowercase(),
            id_column: "id".to_string(),
            passcode_column: "passcode".to_string(),
            expired_at_column: "expiredat".to_string(),
        }
    }

    pub fn with_columns(mut self, id: &str, passcode: &str, expired_at: &str) -> Self {
        self.id_column = id.to_lowercase();
        self.passcode_column = passcode.to_lowercase();
        self.expired_at_column = expired_at.to_lowercase();
        self
    }

    /// Store `passcode` for `id`, replacing any previous one
    pub fn save(&self, id: &str, passcode: &str, expired_at: DateTime<Utc>) -> MapperResult<u64> {
        let statement = Statement::new(
            format!(
                "insert into {}({},{},{}) values(?,?,?)",
                self.table, self.id_column, self.passcode_column, self.expired_at_column
            ),
            vec![CqlValue::from(id), CqlValue::from(passcode), expired_at.to_cql()],
        );
        debug!(table = %self.table, "Saving passcode");
        session::execute(self.provider.as_ref(), &statement)?;
        Ok(1)
    }

    /// Passcode and expiry stored for `id`
    pub fn load(&self, id: &str) -> MapperResult<Option<(String, DateTime<Utc>)>> {
        let query = format!(
            "select {},{} from {} where {}=?",
            self.passcode_column, self.expired_at_column, self.table, self.id_column
        );
        let params = [CqlValue::from(id)];

        let mut session = SessionGuard::acquire(self.provider.as_ref())?;
        let mut rows = session.query(&query, &params, None)?;
        let Some(row) = rows.next_row()? else {
            return Ok(None);
        };
        match row {
            [passcode, expired_at, ..] => Ok(Some((
                String::from_cql(passcode.clone())?,
                DateTime::<Utc>::from_cql(expired_at.clone())?,
            ))),
            _ => Err(MapperError::schema_mismatch(format!(
                "passcode row from {} has {} columns",
                self.table,
                row.len()
            ))),
        }
    }

    pub fn delete(&self, id: &str) -> MapperResult<u64> {
        let statement = Statement::new(
            format!("delete from {} where {}=?", self.table, self.id_column),
            vec![CqlValue::from(id)],
        );
        debug!(table = %self.table, "Deleting passcode");
        session::execute(self.provider.as_ref(), &statement)?;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::TimeZone;

    #[test]
    fn test_save_load_delete() {
        let store = MemoryStore::new();
        store.create_table("passcodes", &["id"]);
        let repository = PasscodeRepository::new(Arc::new(store.clone()), "Passcodes");
        let expiry = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(repository.save("u1", "483920", expiry).unwrap(), 1);
        assert_eq!(
            repository.load("u1").unwrap(),
            Some(("483920".to_string(), expiry))
        );

        let later = expiry + chrono::Duration::minutes(5);
        repository.save("u1", "112233", later).unwrap();
        assert_eq!(repository.load("u1").unwrap().unwrap().0, "112233");
        assert_eq!(store.row_count("passcodes"), 1);

        assert_eq!(repository.delete("u1").unwrap(), 1);
        assert_eq!(repository.load("u1").unwrap(), None);
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn test_custom_columns() {
        let store = MemoryStore::new();
        store.create_table("otp", &["userid"]);
        let repository = PasscodeRepository::new(Arc::new(store.clone()), "otp")
            .with_columns("UserId", "Code", "ExpiresAt");
        let expiry = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        repository.save("u2", "000111", expiry).unwrap();
        assert_eq!(repository.load("u2").unwrap().unwrap().0, "000111");
        assert_eq!(repository.load("missing").unwrap(), None);
    }

    #[test]
    fn test_store_failure_releases_session() {
        let store = MemoryStore::new();
        store.create_table("passcodes", &["id"]);
        store.fail_on("select");
        let repository = PasscodeRepository::new(Arc::new(store.clone()), "passcodes");

        assert!(matches!(repository.load("u1"), Err(MapperError::Store(_))));
        assert_eq!(store.open_sessions(), 0);
    }
}
