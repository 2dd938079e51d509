use crate::{
    db::DbPool,
    entities::menu_item::{
        self, ActiveModel as MenuItemActiveModel, Entity as MenuItemEntity, Model as MenuItemModel,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

fn validate_price(price: &Decimal) -> Result<(), validator::ValidationError> {
    if price.is_sign_negative() {
        return Err(validator::ValidationError::new("price_negative"));
    }
    Ok(())
}

/// Request/Response types for the catalog service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateMenuItemRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    pub stock: Option<i32>,
    pub is_available: Option<bool>,
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateMenuItemRequest {
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Category cannot be empty"))]
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub is_available: Option<bool>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MenuItemResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub stock: i32,
    pub is_available: bool,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<MenuItemModel> for MenuItemResponse {
    fn from(model: MenuItemModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            category: model.category,
            price: model.price,
            stock: model.stock,
            is_available: model.is_available,
            image_url: model.image_url,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Service for managing the menu catalog
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
}

impl CatalogService {
    /// Creates a new catalog service instance
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Lists menu items, newest first, optionally narrowed by category or
    /// availability. The menu is public so no caller context is needed.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        category: Option<String>,
        available_only: bool,
    ) -> Result<Vec<MenuItemResponse>, ServiceError> {
        let db = &*self.db_pool;

        let mut query = MenuItemEntity::find().order_by_desc(menu_item::Column::CreatedAt);

        if let Some(category) = category {
            query = query.filter(menu_item::Column::Category.eq(category));
        }

        if available_only {
            query = query.filter(menu_item::Column::IsAvailable.eq(true));
        }

        let items = query.all(db).await.map_err(|e| {
            error!(error = %e, "Failed to fetch menu items");
            ServiceError::DatabaseError(e)
        })?;

        Ok(items.into_iter().map(MenuItemResponse::from).collect())
    }

    /// Creates a new menu item
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_item(
        &self,
        request: CreateMenuItemRequest,
    ) -> Result<MenuItemResponse, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;
        let item_id = Uuid::new_v4();

        let active_model = MenuItemActiveModel {
            id: Set(item_id),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            category: Set(request.category.trim().to_string()),
            price: Set(request.price),
            // Negative stock is clamped rather than rejected
            stock: Set(request.stock.unwrap_or(0).max(0)),
            is_available: Set(request.is_available.unwrap_or(true)),
            image_url: Set(request.image_url),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let model = active_model.insert(db).await.map_err(|e| {
            error!(error = %e, item_id = %item_id, "Failed to create menu item");
            ServiceError::DatabaseError(e)
        })?;

        info!(item_id = %item_id, name = %model.name, "Menu item created");

        Ok(MenuItemResponse::from(model))
    }

    /// Fetches a single menu item by id
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn get_item(&self, item_id: Uuid) -> Result<MenuItemResponse, ServiceError> {
        let db = &*self.db_pool;

        let item = MenuItemEntity::find_by_id(item_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, item_id = %item_id, "Failed to fetch menu item");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Menu item {} not found", item_id)))?;

        Ok(MenuItemResponse::from(item))
    }

    /// Applies a partial update to a menu item
    #[instrument(skip(self, request), fields(item_id = %item_id))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        request: UpdateMenuItemRequest,
    ) -> Result<MenuItemResponse, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;

        let item = MenuItemEntity::find_by_id(item_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, item_id = %item_id, "Failed to fetch menu item for update");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                warn!(item_id = %item_id, "Menu item not found for update");
                ServiceError::NotFound(format!("Menu item {} not found", item_id))
            })?;

        let mut active_model = item.into_active_model();

        if let Some(name) = request.name {
            active_model.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active_model.description = Set(Some(description));
        }
        if let Some(category) = request.category {
            active_model.category = Set(category.trim().to_string());
        }
        if let Some(price) = request.price {
            active_model.price = Set(price);
        }
        if let Some(stock) = request.stock {
            active_model.stock = Set(stock.max(0));
        }
        if let Some(is_available) = request.is_available {
            active_model.is_available = Set(is_available);
        }
        if let Some(image_url) = request.image_url {
            active_model.image_url = Set(Some(image_url));
        }

        active_model.updated_at = Set(Some(Utc::now()));

        let updated = active_model.update(db).await.map_err(|e| {
            error!(error = %e, item_id = %item_id, "Failed to update menu item");
            ServiceError::DatabaseError(e)
        })?;

        info!(item_id = %item_id, "Menu item updated");

        Ok(MenuItemResponse::from(updated))
    }

    /// Deletes a menu item. Orders keep their own copies of the item name and
    /// price, so removing it never touches order history.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn delete_item(&self, item_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let result = MenuItemEntity::delete_by_id(item_id).exec(db).await.map_err(|e| {
            error!(error = %e, item_id = %item_id, "Failed to delete menu item");
            ServiceError::DatabaseError(e)
        })?;

        if result.rows_affected == 0 {
            warn!(item_id = %item_id, "Menu item not found for deletion");
            return Err(ServiceError::NotFound(format!(
                "Menu item {} not found",
                item_id
            )));
        }

        info!(item_id = %item_id, "Menu item deleted");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_prices_fail_validation() {
        let request = CreateMenuItemRequest {
            name: "Veggie Wrap".to_string(),
            description: None,
            category: "mains".to_string(),
            price: dec!(-1.50),
            stock: None,
            is_available: None,
            image_url: None,
        };

        assert!(request.validate().is_err());
    }

    #[test]
    fn blank_name_fails_validation() {
        let request = CreateMenuItemRequest {
            name: String::new(),
            description: None,
            category: "mains".to_string(),
            price: dec!(4.00),
            stock: Some(10),
            is_available: Some(true),
            image_url: None,
        };

        assert!(request.validate().is_err());
    }

    #[test]
    fn partial_update_with_no_fields_is_valid() {
        let request = UpdateMenuItemRequest::default();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn model_conversion_keeps_every_field() {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let model = MenuItemModel {
            id,
            name: "Espresso".to_string(),
            description: Some("Double shot".to_string()),
            category: "drinks".to_string(),
            price: dec!(2.50),
            stock: 40,
            is_available: true,
            image_url: None,
            created_at: now,
            updated_at: None,
        };

        let response = MenuItemResponse::from(model);
        assert_eq!(response.id, id);
        assert_eq!(response.price, dec!(2.50));
        assert_eq!(response.stock, 40);
        assert!(response.is_available);
    }
}
