pub mod mailer;
pub mod templates;

pub use mailer::*;
pub use templates::*;
