//! Document tables. Both collections share one row shape: the identity key,
//! an insertion sequence used as the stable tie-breaker when listing, and the
//! JSONB document itself.

pub mod group_doc;
pub mod user_doc;
