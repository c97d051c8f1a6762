use soilbucket_macros::Columnar;

#[derive(Debug, Clone, Copy, Columnar)]
pub struct CellSums {
    pub act_et: f64,
    pub recharge: f64,
    pub runoff: f64,
}

fn main() {
    let row = CellSums { act_et: 1.0, recharge: 2.0, runoff: 3.0 };
    let mut table = CellSumsTable::with_capacity(10);
    table.push(&row);
    assert_eq!(table.len(), 1);
    assert!(!table.is_empty());
    assert_eq!(table.recharge, vec![2.0]);
    assert_eq!(CellSums::field_names(), &["act_et", "recharge", "runoff"]);
}
