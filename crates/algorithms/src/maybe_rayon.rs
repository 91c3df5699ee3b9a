//! Row loops that run on rayon when the `parallel` feature is on.
//!
//! Every grid pass in this crate starts from `(0..rows).into_par_iter()`.
//! Without the feature that call falls back to a plain iterator, and the
//! rest of the chain (`map`, `flat_map`, `collect`) resolves to `Iterator`.
#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
pub use serial::IntoParallelIterator;

#[cfg(not(feature = "parallel"))]
mod serial {
    pub trait IntoParallelIterator: IntoIterator + Sized {
        fn into_par_iter(self) -> Self::IntoIter {
            self.into_iter()
        }
    }

    impl<I: IntoIterator> IntoParallelIterator for I {}
}
