use crate::domain::order::{NewOrder, Order};
use crate::error::{OrderError, Result};
use std::io::Read;

/// Reads orders handed over by checkout as a stream of JSON objects
/// (newline-delimited or concatenated).
pub struct OrderReader<R: Read> {
    source: R,
}

impl<R: Read> OrderReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Returns an iterator that lazily reads and validates orders.
    ///
    /// An order failing validation yields an error and reading continues;
    /// a JSON error ends the stream.
    pub fn orders(self) -> impl Iterator<Item = Result<Order>> {
        serde_json::Deserializer::from_reader(self.source)
            .into_iter::<NewOrder>()
            .map(|result| result.map_err(OrderError::from).and_then(Order::new))
    }
}
