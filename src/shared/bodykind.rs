/// The body kind of the HTTP message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// A fixed body length set by the `Content-Length` header.
    /// Messages without a body have the value `Fixed(0)`.
    Fixed(u64),
    /// A chunked body set by `Transfer-Encoding: chunked`.
    ///
    /// Any `Content-Length` is ignored in this mode.
    Chunked,
}

impl BodyKind {
    /// True when no body bytes follow the header
    pub fn is_empty(&self) -> bool {
        matches!(*self, BodyKind::Fixed(0))
    }
}
