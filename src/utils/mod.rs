use std::{future::Future, pin::Pin};

mod error;
mod stream;

pub use error::*;
pub use stream::*;

/// PBF = Pin Box Future
pub type PBF<'a, O> = Pin<Box<dyn Future<Output = O> + Send + 'a>>;
