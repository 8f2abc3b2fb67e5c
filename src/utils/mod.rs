pub mod clock;
pub mod dates;
pub mod jwt;
pub mod pagination;
pub mod phone;

pub use clock::Clock;
pub use dates::{add_months, day_start};
pub use jwt::*;
pub use pagination::*;
pub use phone::validate_vn_phone;
