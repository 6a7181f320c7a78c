//! page_views / page_view_hours 表操作
//!
//! 累加使用 upsert：`col = col + excluded.col`（MySQL 为 `VALUES(col)`），
//! 天级行与小时行在同一个事务内更新。

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseBackend, DbErr, EntityTrait,
    ExprTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::debug;

use super::SeaOrmStore;
use super::converters::{group_hours_by_page, rows_to_bucket};
use super::retry::{self, classify_db_error};
use crate::errors::Result;
use crate::storage::models::{ViewBucket, bucket_doc_id, date_key};
use migration::entities::{page_view, page_view_hour};

/// 冲突时新写入的值：SQLite/PostgreSQL 使用 excluded.column，MySQL 使用 VALUES(column)
fn incoming_value(backend: DatabaseBackend, column_name: &str) -> Expr {
    match backend {
        DatabaseBackend::MySql => Expr::cust(format!("VALUES({})", column_name)),
        _ => Expr::cust(format!("excluded.{}", column_name)),
    }
}

impl SeaOrmStore {
    pub(super) async fn find_bucket(
        &self,
        page_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ViewBucket>> {
        let db = &self.db;
        let key = date_key(date);

        let (daily, hours) = retry::with_retry("get_bucket", self.retry_config, || async {
            let daily = page_view::Entity::find()
                .filter(page_view::Column::PageId.eq(page_id))
                .filter(page_view::Column::Date.eq(key.as_str()))
                .one(db)
                .await?;
            let hours = match daily {
                Some(_) => {
                    page_view_hour::Entity::find()
                        .filter(page_view_hour::Column::PageId.eq(page_id))
                        .filter(page_view_hour::Column::Date.eq(key.as_str()))
                        .all(db)
                        .await?
                }
                None => Vec::new(),
            };
            Ok::<_, DbErr>((daily, hours))
        })
        .await
        .map_err(|e| classify_db_error("get_bucket", e))?;

        match daily {
            Some(daily) => Ok(Some(rows_to_bucket(daily, &hours)?)),
            None => Ok(None),
        }
    }

    pub(super) async fn upsert_bucket_increment(
        &self,
        page_id: &str,
        date: NaiveDate,
        hours: &[(u8, u64)],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let hours: Vec<(u8, u64)> = hours
            .iter()
            .copied()
            .filter(|&(hour, amount)| hour < 24 && amount > 0)
            .collect();
        if hours.is_empty() {
            return Ok(());
        }

        let key = date_key(date);
        let total: u64 = hours.iter().map(|(_, amount)| amount).sum();

        retry::with_retry("increment_bucket", self.retry_config, || async {
            self.increment_in_transaction(page_id, &key, &hours, total, at)
                .await
        })
        .await
        .map_err(|e| classify_db_error("increment_bucket", e))?;

        debug!(
            "Bucket {} incremented by {} across {} hours",
            bucket_doc_id(page_id, date),
            total,
            hours.len()
        );
        Ok(())
    }

    async fn increment_in_transaction(
        &self,
        page_id: &str,
        key: &str,
        hours: &[(u8, u64)],
        total: u64,
        at: DateTime<Utc>,
    ) -> std::result::Result<(), DbErr> {
        let backend = self.db.get_database_backend();
        let txn = self.db.begin().await?;

        // 1. 天级行：total_views 累加，last_updated 取最新
        let daily = page_view::ActiveModel {
            page_id: Set(page_id.to_string()),
            date: Set(key.to_string()),
            total_views: Set(total as i64),
            last_updated: Set(at),
            ..Default::default()
        };
        let daily_conflict =
            OnConflict::columns([page_view::Column::PageId, page_view::Column::Date])
                .value(
                    page_view::Column::TotalViews,
                    Expr::col(page_view::Column::TotalViews)
                        .add(incoming_value(backend, "total_views")),
                )
                .update_column(page_view::Column::LastUpdated)
                .to_owned();
        page_view::Entity::insert(daily)
            .on_conflict(daily_conflict)
            .exec_without_returning(&txn)
            .await?;

        // 2. 小时行：单条 SQL 批量累加
        let models: Vec<page_view_hour::ActiveModel> = hours
            .iter()
            .map(|&(hour, amount)| page_view_hour::ActiveModel {
                page_id: Set(page_id.to_string()),
                date: Set(key.to_string()),
                hour: Set(hour as i32),
                views: Set(amount as i64),
                ..Default::default()
            })
            .collect();
        let hour_conflict = OnConflict::columns([
            page_view_hour::Column::PageId,
            page_view_hour::Column::Date,
            page_view_hour::Column::Hour,
        ])
        .value(
            page_view_hour::Column::Views,
            Expr::col(page_view_hour::Column::Views).add(incoming_value(backend, "views")),
        )
        .to_owned();
        page_view_hour::Entity::insert_many(models)
            .on_conflict(hour_conflict)
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await
    }

    pub(super) async fn find_top_buckets(
        &self,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ViewBucket>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = &self.db;
        let key = date_key(date);

        let (dailies, hour_rows) =
            retry::with_retry("top_buckets_for_date", self.retry_config, || async {
                let dailies = page_view::Entity::find()
                    .filter(page_view::Column::Date.eq(key.as_str()))
                    .order_by_desc(page_view::Column::TotalViews)
                    .order_by_asc(page_view::Column::PageId)
                    .limit(limit as u64)
                    .all(db)
                    .await?;
                if dailies.is_empty() {
                    return Ok::<_, DbErr>((dailies, Vec::new()));
                }
                let page_ids: Vec<String> = dailies.iter().map(|d| d.page_id.clone()).collect();
                let hour_rows = page_view_hour::Entity::find()
                    .filter(page_view_hour::Column::Date.eq(key.as_str()))
                    .filter(page_view_hour::Column::PageId.is_in(page_ids))
                    .all(db)
                    .await?;
                Ok((dailies, hour_rows))
            })
            .await
            .map_err(|e| classify_db_error("top_buckets_for_date", e))?;

        let mut grouped = group_hours_by_page(hour_rows);
        dailies
            .into_iter()
            .map(|daily| {
                let hours = grouped.remove(&daily.page_id).unwrap_or_default();
                rows_to_bucket(daily, &hours)
            })
            .collect()
    }
}
