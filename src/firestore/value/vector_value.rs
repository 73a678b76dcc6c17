/// Dense embedding stored as a list of doubles.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorValue {
    values: Vec<f64>,
}

impl VectorValue {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
