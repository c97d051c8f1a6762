/// Generate a frozen `#[pyclass]` struct where each field is a typed
/// `Py<PyArray1<T>>` column.
///
/// Also generates a `from_table()` method that moves the columns out of the
/// corresponding core `*Table` struct.
macro_rules! define_table_result {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident from $core_type:ty {
            $($field:ident: $ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[pyo3::pyclass(frozen)]
        $vis struct $name {
            $(
                #[pyo3(get)]
                pub $field: Py<numpy::PyArray1<$ty>>,
            )+
        }

        impl $name {
            pub fn from_table(py: pyo3::Python<'_>, table: $core_type) -> Self {
                Self {
                    $(
                        $field: numpy::PyArray1::from_vec(py, table.$field).unbind(),
                    )+
                }
            }
        }
    };
}

/// Generate a frozen `#[pyclass]` struct where each field is `f64`.
///
/// Also generates a `from_core()` method that copies values from the
/// corresponding core struct.
macro_rules! define_scalar_result {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident from $core_type:ty {
            $($field:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[pyo3::pyclass(frozen)]
        $vis struct $name {
            $(
                #[pyo3(get)]
                pub $field: f64,
            )+
        }

        impl $name {
            pub fn from_core(v: &$core_type) -> Self {
                Self {
                    $(
                        $field: v.$field,
                    )+
                }
            }
        }
    };
}
