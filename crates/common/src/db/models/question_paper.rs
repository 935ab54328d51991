//! Question paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "question_papers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub subject_name: String,

    pub subject_code: String,

    /// Item code printed on the exam sheet; unique together with the year
    pub paper_code: Option<String>,

    pub year_of_examination: i32,

    /// 1..=10, enforced by a check constraint
    pub semester: i32,

    pub subject_type_id: Option<i32>,

    pub program_type_id: Option<i32>,

    pub department_id: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub file_url: String,

    pub file_type: String,

    pub original_filename: Option<String>,

    pub created_by: Option<i32>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    Creator,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
