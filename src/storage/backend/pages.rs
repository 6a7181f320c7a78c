//! pages / users 表操作

use sea_orm::sea_query::{Expr, NullOrdering, OnConflict};
use sea_orm::{
    ColumnTrait, EntityTrait, ExprTrait, Order, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::trace;

use super::SeaOrmStore;
use super::converters::{model_to_page, model_to_user, page_to_active_model, user_to_active_model};
use super::retry::{self, classify_db_error};
use crate::errors::{Result, ViewsError};
use crate::storage::models::{Page, PageOrder, UserProfile};
use migration::entities::{page, user};

impl SeaOrmStore {
    pub(super) async fn find_page(&self, page_id: &str) -> Result<Option<Page>> {
        let db = &self.db;
        let model = retry::with_retry("get_page", self.retry_config, || async {
            page::Entity::find_by_id(page_id.to_string()).one(db).await
        })
        .await
        .map_err(|e| classify_db_error("get_page", e))?;

        Ok(model.map(model_to_page))
    }

    pub(super) async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let db = &self.db;
        let model = retry::with_retry("get_user", self.retry_config, || async {
            user::Entity::find_by_id(user_id.to_string()).one(db).await
        })
        .await
        .map_err(|e| classify_db_error("get_user", e))?;

        Ok(model.map(model_to_user))
    }

    pub(super) async fn add_page_views(&self, page_id: &str, amount: u64) -> Result<()> {
        let db = &self.db;
        let result = retry::with_retry("increment_page_views", self.retry_config, || async {
            page::Entity::update_many()
                .col_expr(
                    page::Column::Views,
                    Expr::col(page::Column::Views).add(Expr::val(amount as i64)),
                )
                .filter(page::Column::Id.eq(page_id))
                .exec(db)
                .await
        })
        .await
        .map_err(|e| classify_db_error("increment_page_views", e))?;

        if result.rows_affected == 0 {
            return Err(ViewsError::not_found(format!("pages/{}", page_id)));
        }
        trace!("SeaOrmStore: pages/{} views += {}", page_id, amount);
        Ok(())
    }

    pub(super) async fn update_views_24h(&self, page_id: &str, views_24h: u64) -> Result<()> {
        let db = &self.db;
        let result = retry::with_retry("set_page_views_24h", self.retry_config, || async {
            page::Entity::update_many()
                .col_expr(page::Column::Views24h, Expr::val(views_24h as i64))
                .filter(page::Column::Id.eq(page_id))
                .exec(db)
                .await
        })
        .await
        .map_err(|e| classify_db_error("set_page_views_24h", e))?;

        if result.rows_affected == 0 {
            return Err(ViewsError::not_found(format!("pages/{}", page_id)));
        }
        Ok(())
    }

    pub(super) async fn find_top_pages(&self, order: PageOrder, limit: usize) -> Result<Vec<Page>> {
        let db = &self.db;
        let models = retry::with_retry("top_public_pages", self.retry_config, || async {
            let query = page::Entity::find()
                .filter(page::Column::IsPublic.eq(true))
                .filter(page::Column::Deleted.eq(false));
            let query = match order {
                PageOrder::Views24h => query
                    .order_by_with_nulls(page::Column::Views24h, Order::Desc, NullOrdering::Last)
                    .order_by_desc(page::Column::Views),
                PageOrder::Lifetime => query.order_by_desc(page::Column::Views),
            };
            query
                .order_by_asc(page::Column::Id)
                .limit(limit as u64)
                .all(db)
                .await
        })
        .await
        .map_err(|e| classify_db_error("top_public_pages", e))?;

        Ok(models.into_iter().map(model_to_page).collect())
    }

    pub(super) async fn save_page(&self, p: &Page) -> Result<()> {
        let db = &self.db;
        let model = page_to_active_model(p);
        let on_conflict = OnConflict::column(page::Column::Id)
            .update_columns([
                page::Column::UserId,
                page::Column::Title,
                page::Column::IsPublic,
                page::Column::Deleted,
                page::Column::Views,
                page::Column::Views24h,
            ])
            .to_owned();

        retry::with_retry("upsert_page", self.retry_config, || async {
            page::Entity::insert(model.clone())
                .on_conflict(on_conflict.clone())
                .exec_without_returning(db)
                .await
        })
        .await
        .map_err(|e| classify_db_error("upsert_page", e))?;

        Ok(())
    }

    pub(super) async fn save_user(&self, u: &UserProfile) -> Result<()> {
        let db = &self.db;
        let model = user_to_active_model(u);
        let on_conflict = OnConflict::column(user::Column::Id)
            .update_columns([user::Column::Username, user::Column::DisplayName])
            .to_owned();

        retry::with_retry("upsert_user", self.retry_config, || async {
            user::Entity::insert(model.clone())
                .on_conflict(on_conflict.clone())
                .exec_without_returning(db)
                .await
        })
        .await
        .map_err(|e| classify_db_error("upsert_user", e))?;

        Ok(())
    }
}
