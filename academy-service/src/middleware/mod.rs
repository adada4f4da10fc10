pub mod context;

pub use context::{AcademyContext, UserContext, ACADEMY_ID_HEADER, USER_ID_HEADER};
