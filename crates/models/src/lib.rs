//! Record shapes and document primitives shared by the storage backends.

pub mod counts;
pub mod db;
pub mod document;
pub mod entities;
pub mod errors;
pub mod group;
pub mod ids;
pub mod user;

pub use counts::MessageCounts;
pub use document::{Collection, Document, FieldPath, Patch};
pub use group::{GroupRecord, GroupSettings, GroupUpdate, Member, SettingsUpdate};
pub use ids::{is_group_id, normalize_id};
pub use user::{UserCounter, UserRecord, UserUpdate};
