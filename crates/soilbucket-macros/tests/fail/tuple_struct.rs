use soilbucket_macros::Columnar;

#[derive(Columnar)]
pub struct Sums(f64, f64);

fn main() {
    let _ = Sums(1.0, 2.0);
}
