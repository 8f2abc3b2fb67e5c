pub mod cart;
pub mod common;
pub mod discount;
pub mod membership;
pub mod order;
pub mod plan;
pub mod product;
pub mod user;

pub use cart::*;
pub use common::*;
pub use discount::*;
pub use membership::*;
pub use order::*;
pub use plan::*;
pub use product::*;
pub use user::*;
