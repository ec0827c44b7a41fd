use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use super::hash::hash;

/// A pre-hashed key. Comparing and re-hashing a `HashValue` is a single
/// `u64` operation no matter how long the source key was.
#[derive(Debug, PartialEq, Eq)]
pub struct HashValue<T>(u64, PhantomData<T>)
where
    T: Hash + ?Sized;

impl<T> Clone for HashValue<T>
where
    T: Hash + ?Sized,
{
    fn clone(&self) -> Self {
        HashValue(self.0, self.1)
    }
}

impl<T> Copy for HashValue<T> where T: Hash + ?Sized {}

impl<T> Hash for HashValue<T>
where
    T: Hash + ?Sized,
{
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.0.hash(state);
    }
}

impl<F> From<F> for HashValue<str>
where
    F: Borrow<str>,
{
    fn from(v: F) -> Self {
        HashValue(hash(&v.borrow()), PhantomData)
    }
}

impl<T> PartialEq<T> for HashValue<str>
where
    T: Borrow<str>,
{
    fn eq(&self, rhs: &T) -> bool {
        hash(&rhs.borrow()) == self.0
    }
}
