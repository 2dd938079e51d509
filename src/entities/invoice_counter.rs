use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per calendar year holding the last sequence value handed out for
/// invoice numbers. Incremented with a single conditional UPDATE inside the
/// issuing transaction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub year: i32,
    pub last_value: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
