pub mod category;
pub mod config;
pub mod question;
pub mod question_type;
pub mod questionnaire;

pub use category::*;
pub use config::*;
pub use question::*;
pub use question_type::*;
pub use questionnaire::*;
