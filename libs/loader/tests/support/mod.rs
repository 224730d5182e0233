#![allow(dead_code)]
//! Shared fixtures for loader integration tests

use std::io::Write;
use std::sync::Arc;

use sluice_loader::store::{MemoryStore, MemoryStoreOptions, Store};
use tempfile::NamedTempFile;

pub const HEADER: &str = "Customer Id,Name,Email,Company,City,Country,Birthday";

/// Data line for record `i`. Every seventh record has an invalid email.
pub fn customer_line(i: usize) -> String {
    let email = if i % 7 == 3 {
        format!("customer{i}-at-example.com")
    } else {
        format!("customer{i}@example.com")
    };
    format!(
        "{i},\"Customer {i}\",{email},\"Company {}, Ltd\",City {},Country {},19{:02}-0{}-1{}",
        i % 13,
        i % 17,
        i % 5,
        50 + i % 50,
        1 + i % 9,
        i % 10
    )
}

pub fn valid_email_count(rows: usize) -> usize {
    (0..rows).filter(|i| i % 7 != 3).count()
}

pub fn write_lines(lines: &[String], terminator: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp csv");
    write!(file, "{HEADER}{terminator}").expect("write header");
    for line in lines {
        write!(file, "{line}{terminator}").expect("write line");
    }
    file.flush().expect("flush csv");
    file
}

pub fn customers_csv(rows: usize) -> NamedTempFile {
    let lines: Vec<String> = (0..rows).map(customer_line).collect();
    write_lines(&lines, "\n")
}

/// `rows` lines where the one at zero-based `bad_index` has only six fields.
pub fn csv_with_short_line(rows: usize, bad_index: usize) -> NamedTempFile {
    let lines: Vec<String> = (0..rows)
        .map(|i| {
            if i == bad_index {
                format!("{i},Short,short{i}@example.com,Co,City,1990-01-01")
            } else {
                customer_line(i)
            }
        })
        .collect();
    write_lines(&lines, "\n")
}

pub fn memory_store() -> (MemoryStore, Arc<dyn Store>) {
    let store = MemoryStore::new();
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    (store, shared)
}

pub fn memory_store_with(options: MemoryStoreOptions) -> (MemoryStore, Arc<dyn Store>) {
    let store = MemoryStore::with_options(options);
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    (store, shared)
}

/// Stored `custom_id`s as sorted integers.
pub fn stored_ids(store: &MemoryStore) -> Vec<usize> {
    let mut ids: Vec<usize> = store
        .rows()
        .iter()
        .map(|row| row.customer.custom_id.parse().expect("numeric id"))
        .collect();
    ids.sort_unstable();
    ids
}
