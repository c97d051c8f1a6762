use soilbucket_macros::Columnar;

#[derive(Debug, Clone, Copy, PartialEq, Columnar)]
pub struct MonthRow {
    pub year: i32,
    pub month: u32,
    pub prec: f64,
}

fn main() {
    let mut table = MonthRowTable::default();
    assert!(table.is_empty());
    table.push(&MonthRow { year: 2001, month: 3, prec: 42.0 });
    table.push(&MonthRow { year: 2001, month: 4, prec: 17.5 });
    assert_eq!(table.year, vec![2001, 2001]);
    assert_eq!(table.month, vec![3, 4]);
    assert_eq!(table.get(1), Some(MonthRow { year: 2001, month: 4, prec: 17.5 }));
    assert_eq!(table.get(2), None);
}
