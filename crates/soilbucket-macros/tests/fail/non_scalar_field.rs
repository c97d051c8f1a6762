use soilbucket_macros::Columnar;

#[derive(Columnar)]
pub struct Samples {
    pub samples: Vec<f64>,
}

fn main() {
    let _ = Samples { samples: Vec::new() };
}
