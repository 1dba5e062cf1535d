//! Message-level types shared by the request parser and the response
//! generator.

pub use self::bodykind::BodyKind;
pub use self::version::Version;

mod bodykind;
mod version;
