use std::ops::{Index, IndexMut};

/// Dense vector of fixed length owned by one subdomain.
///
/// The length is fixed at construction; kernels mutate the values in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    values: Box<[f64]>,
}

impl Vector {
    pub fn zeros(len: usize) -> Self {
        Self::filled(len, 0.0)
    }

    pub fn filled(len: usize, value: f64) -> Self {
        Self {
            values: vec![value; len].into_boxed_slice(),
        }
    }

    pub fn from_fn<F: FnMut(usize) -> f64>(len: usize, fun: F) -> Self {
        Self {
            values: (0..len).map(fun).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    pub fn fill(&mut self, value: f64) {
        for v in self.values.iter_mut() {
            *v = value;
        }
    }

    /// Copies the contents of `other` into `self`.
    ///
    /// # Panics
    /// Panics if the lengths differ.
    pub fn copy_from(&mut self, other: &Vector) {
        self.values.copy_from_slice(&other.values);
    }

    /// Returns `true` if both vectors refer to the same storage.
    #[inline]
    pub fn is_aliased(&self, other: &Vector) -> bool {
        std::ptr::eq(self.values.as_ptr(), other.values.as_ptr())
    }
}

impl From<Vec<f64>> for Vector {
    fn from(values: Vec<f64>) -> Self {
        Self {
            values: values.into_boxed_slice(),
        }
    }
}

impl Index<usize> for Vector {
    type Output = f64;

    #[inline]
    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

impl IndexMut<usize> for Vector {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.values[index]
    }
}
