//! Request extractors: the caller's principal and typed path ids.

mod path_id;
mod principal;

pub use path_id::PathId;
pub use principal::{PrincipalExtractor, USER_ID_HEADER, USER_ROLE_HEADER};
