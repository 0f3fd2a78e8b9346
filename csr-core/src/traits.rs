use crate::descriptor::ValueType;
use bytemuck::Pod;
use num_traits::NumAssign;
use std::fmt::Debug;

/// Element type that can live in a CSR value buffer.
///
/// `Pod` lets the value array be cast to bytes for device uploads, and
/// `NumAssign` gives the additive identity returned for absent entries plus
/// in-place accumulation through write proxies.
pub trait Scalar: Pod + NumAssign + Debug + Default + Send + Sync + 'static {
    /// Element-type tag written into descriptors.
    const VALUE_TYPE: ValueType;
}

impl Scalar for f32 {
    const VALUE_TYPE: ValueType = ValueType::F32;
}

impl Scalar for f64 {
    const VALUE_TYPE: ValueType = ValueType::F64;
}

impl Scalar for i32 {
    const VALUE_TYPE: ValueType = ValueType::I32;
}

impl Scalar for u32 {
    const VALUE_TYPE: ValueType = ValueType::U32;
}

/// Generic trait representing a matrix.
/// Implementations can be host-resident or device-resident.
pub trait Matrix: Debug {
    /// The underlying numeric type of the matrix elements.
    type Value: Scalar;

    /// Returns the dimensions of the matrix as (rows, columns).
    fn dims(&self) -> (usize, usize);

    /// Returns the number of rows.
    fn rows(&self) -> usize {
        self.dims().0
    }

    /// Returns the number of columns.
    fn cols(&self) -> usize {
        self.dims().1
    }

    /// Checks if the matrix is square.
    fn is_square(&self) -> bool {
        let (rows, cols) = self.dims();
        rows == cols
    }
}
