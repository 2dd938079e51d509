use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Menu item entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "menu_items")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name of the dish
    #[validate(length(
        min = 1,
        max = 255,
        message = "Menu item name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Optional longer description shown on the menu
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,

    /// Menu section, e.g. "mains", "drinks", "desserts"
    #[validate(length(
        min = 1,
        max = 100,
        message = "Category must be between 1 and 100 characters"
    ))]
    pub category: String,

    /// Unit price in the cafeteria's currency
    pub price: Decimal,

    /// Units currently available for sale, never negative
    pub stock: i32,

    /// Manual availability switch, independent of stock
    pub is_available: bool,

    /// URL to a picture of the dish
    pub image_url: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.is_available {
                active_model.is_available = Set(true);
            }

            if let ActiveValue::NotSet = active_model.stock {
                active_model.stock = Set(0);
            }

            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}
