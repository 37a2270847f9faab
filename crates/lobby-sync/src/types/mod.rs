mod canonical_path;
mod identity;
mod resource_type;

pub use canonical_path::CanonicalPath;
pub use identity::Identity;
pub use resource_type::ResourceType;
