//! Cursor pagination, search and export against the in-memory store

mod common;

use common::{account, store, Account};
use cqlmap_mapper::builder::build_select_all;
use cqlmap_mapper::config::PagingConfig;
use cqlmap_mapper::cursor::paged_scan;
use cqlmap_mapper::search::sorted;
use cqlmap_mapper::{
    schema_of, BatchWriter, CqlValue, Exporter, MapperError, MapperResult, SearchBuilder,
    Statement,
};
use std::collections::HashSet;
use std::sync::Arc;

fn seed(count: usize) -> (cqlmap_mapper::MemoryStore, Arc<dyn cqlmap_mapper::SessionProvider>) {
    let (store, provider) = store();
    let models: Vec<Account> = (0..count)
        .map(|i| account(&format!("acc-{i:03}"), &format!("user {}", count - i)))
        .collect();
    BatchWriter::<Account>::new(Arc::clone(&provider), "accounts")
        .unwrap()
        .save(&models)
        .unwrap();
    (store, provider)
}

fn select_all() -> Statement {
    Statement::text(build_select_all("accounts", &schema_of::<Account>().unwrap()))
}

#[test]
fn test_pages_do_not_repeat_rows() {
    let (store, provider) = seed(23);
    let schema = schema_of::<Account>().unwrap();
    let index = schema.fields_index();

    let mut seen = HashSet::new();
    let mut cursor = String::new();
    let mut pages = 0;
    loop {
        let page = paged_scan::<Account>(provider.as_ref(), &select_all(), Some(&index), 5, &cursor).unwrap();
        for item in &page.items {
            assert!(seen.insert(item.id.clone()), "row {} repeated", item.id);
        }
        pages += 1;
        if page.is_last() {
            break;
        }
        cursor = page.next;
    }

    assert_eq!(pages, 5);
    assert_eq!(seen.len(), 23);
    assert_eq!(store.open_sessions(), 0);
}

#[test]
fn test_sorted_pages_follow_order() {
    let (_, provider) = seed(7);
    let schema = schema_of::<Account>().unwrap();
    let search = SearchBuilder::<Account, String>::new(provider, |sort: &String| {
        let schema = schema_of::<Account>()?;
        Ok(sorted(select_all(), sort, &schema))
    })
    .unwrap();
    assert_eq!(search.schema().type_name(), schema.type_name());

    let mut names = Vec::new();
    let mut cursor = String::new();
    loop {
        let page = search.search(&"displayName".to_string(), 3, &cursor).unwrap();
        names.extend(page.items.into_iter().map(|a| a.display_name));
        if page.next.is_empty() {
            break;
        }
        cursor = page.next;
    }

    let mut expected = names.clone();
    expected.sort();
    assert_eq!(names.len(), 7);
    assert_eq!(names, expected);
}

#[test]
fn test_undecodable_cursor_never_reaches_store() {
    let (store, provider) = seed(3);
    let acquired = store.acquired();
    let executed = store.statements_executed();
    let index = schema_of::<Account>().unwrap().fields_index();

    for token in ["abc", "xyz0", "0g"] {
        let result = paged_scan::<Account>(provider.as_ref(), &select_all(), Some(&index), 5, token);
        assert!(matches!(result, Err(MapperError::BadCursor(_))));
    }
    assert_eq!(store.acquired(), acquired);
    assert_eq!(store.statements_executed(), executed);
}

#[test]
fn test_default_page_size_applies() {
    let (_, provider) = seed(25);
    let search = SearchBuilder::<Account, ()>::new(provider, |_: &()| Ok(select_all()))
        .unwrap()
        .with_paging(PagingConfig::default());
    let page = search.search(&(), 0, "").unwrap();
    assert_eq!(page.items.len(), 20);
    assert!(!page.is_last());
}

#[test]
fn test_export_streams_every_row() {
    let (store, provider) = seed(12);
    let mut exporter = Exporter::<Account, Vec<u8>>::new(provider, select_all(), Vec::new(), |a| {
        Ok(format!("{},{}", a.id, a.display_name))
    })
    .unwrap();

    assert_eq!(exporter.export().unwrap(), 12);
    let out = String::from_utf8(exporter.into_inner()).unwrap();
    assert_eq!(out.lines().count(), 12);
    assert!(out.starts_with("acc-000,user 12\n"));
    assert_eq!(store.open_sessions(), 0);
}

#[test]
fn test_filtered_search() {
    let (_, provider) = seed(4);
    let search = SearchBuilder::<Account, String>::new(provider, |id: &String| -> MapperResult<Statement> {
        let mut statement = select_all();
        statement.query.push_str(" where id = ?");
        statement.params.push(CqlValue::from(id.as_str()));
        Ok(statement)
    })
    .unwrap();

    let page = search.search(&"acc-002".to_string(), 10, "").unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].display_name, "user 2");
    assert!(page.is_last());
}
