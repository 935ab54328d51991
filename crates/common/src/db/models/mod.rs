//! SeaORM entity models
//!
//! Database entities for PaperVault

mod question_paper;
mod user;

/// Role granted to every registered account
pub const ROLE_ADMIN: &str = "admin";

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use question_paper::{
    Entity as QuestionPaperEntity,
    Model as QuestionPaper,
    ActiveModel as QuestionPaperActiveModel,
    Column as QuestionPaperColumn,
};
