use soilbucket_macros::Columnar;

#[derive(Debug, Clone, Copy, Columnar)]
#[columnar(table_name = "StorageLog")]
pub struct StorageEntry {
    pub before: f64,
    pub after: f64,
}

fn main() {
    let e = StorageEntry { before: 50.0, after: 48.5 };
    let mut log = StorageLog::with_capacity(5);
    log.push(&e);
    assert_eq!(log.len(), 1);
    assert_eq!(StorageEntry::field_names(), &["before", "after"]);
}
