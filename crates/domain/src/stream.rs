use std::pin::Pin;

/// A boxed async stream, used for prompt-service streaming and for the
/// engine's outward narrative-event stream.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;
