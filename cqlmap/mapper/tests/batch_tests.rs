//! Bulk writes against the in-memory store

mod common;

use chrono::{TimeZone, Utc};
use common::{account, store, Account};
use cqlmap_mapper::config::BatchConfig;
use cqlmap_mapper::{
    BatchDispatch, BatchWriter, Dao, Mapper, MapperError, MapperResult, StreamWriter,
};
use std::sync::Arc;

struct RequireEmail;

impl Mapper<Account> for RequireEmail {
    fn model_to_db(&self, model: &mut Account) -> MapperResult<()> {
        match &model.email {
            Some(_) => Ok(()),
            None => Err(MapperError::conversion("email is required").in_field("email")),
        }
    }

    fn db_to_model(&self, _model: &mut Account) -> MapperResult<()> {
        Ok(())
    }
}

fn with_email(id: &str) -> Account {
    let mut model = account(id, id);
    model.email = Some(format!("{id}@example.com"));
    model
}

#[test]
fn test_versioned_batch_update() {
    let (store, provider) = store();
    let batch = BatchWriter::<Account>::new(Arc::clone(&provider), "accounts").unwrap();
    batch.insert(&[account("a", "A"), account("b", "B")]).unwrap();

    let dao = Dao::<Account, String>::new(provider, "accounts").unwrap();
    let mut a = dao.load(&"a".to_string()).unwrap().unwrap();
    let mut b = dao.load(&"b".to_string()).unwrap().unwrap();
    a.display_name = "A2".into();
    b.display_name = "B2".into();
    b.version = 9;

    let outcome = batch.update(&[a, b]).unwrap();
    assert_eq!(outcome.succeeded, vec![0, 1]);
    assert_eq!(outcome.affected, 1);
    assert_eq!(dao.load(&"a".to_string()).unwrap().unwrap().version, 2);
    assert_eq!(dao.load(&"b".to_string()).unwrap().unwrap().display_name, "B");
    assert_eq!(store.open_sessions(), 0);
}

#[test]
fn test_partial_failure_reports_indices() {
    let (store, provider) = store();
    store.fail_on("values(?,?,?,?,?,1)");
    let config = BatchConfig {
        batch_size: 10,
        dispatch: BatchDispatch::Individual,
    };
    let batch = BatchWriter::<Account>::new(provider, "accounts")
        .unwrap()
        .with_config(&config)
        .with_mapper(Arc::new(RequireEmail));

    let mut dated = with_email("c");
    dated.created_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    let models = vec![with_email("a"), account("b", "b"), dated, with_email("d")];

    match batch.insert(&models).unwrap_err() {
        MapperError::PartialBatchFailure {
            succeeded,
            failed,
            cause,
        } => {
            assert_eq!(succeeded, vec![0, 3]);
            assert_eq!(failed, vec![1, 2]);
            assert!(matches!(*cause, MapperError::Conversion { field: Some(ref f), .. } if f == "email"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.row_count("accounts"), 2);
    assert_eq!(store.open_sessions(), 0);
}

#[test]
fn test_stream_writer_retains_buffer_until_flushed() {
    let (store, provider) = store();
    let mut stream = StreamWriter::<Account>::new(provider, "accounts", 3).unwrap();

    store.fail_on("insert into accounts");
    stream.write(account("a", "A")).unwrap();
    stream.write(account("b", "B")).unwrap();
    assert!(stream.write(account("c", "C")).is_err());
    assert_eq!(stream.buffered(), 3);
    assert_eq!(store.row_count("accounts"), 0);

    store.clear_faults();
    assert_eq!(stream.write(account("d", "D")).unwrap(), 4);
    assert_eq!(stream.buffered(), 0);
    assert_eq!(store.row_count("accounts"), 4);
    assert_eq!(store.open_sessions(), 0);
}
