//! Verification token claims and compact ES256 serialization.

pub mod builder;
pub mod claims;
pub mod serializer;

pub use builder::JwtBuilder;
pub use claims::{parse_subject, subject_for, Claims};
pub use serializer::JwtSerializer;
