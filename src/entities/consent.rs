use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "consents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub status: String,
    pub user_id: String,
    pub business_id: Option<String>,
    pub client_id: String,
    #[sea_orm(column_type = "Text")]
    pub permissions: String, // JSON array
    pub created_at: i64,
    pub status_updated_at: i64,
    pub expires_at: Option<i64>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub extensions: String, // JSON array, newest first
    #[sea_orm(column_type = "Text")]
    pub resources: String, // JSON object
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
